use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use slog::{info, o, warn, Drain};
use structopt::StructOpt;
use window_counter::{routes, Config, Counter};

#[derive(Debug, StructOpt)]
#[structopt(name = "window-counter")]
struct Options {
    #[structopt(long, env = "BACKUP_FILE", default_value = "backup")]
    backup_file: PathBuf,
    #[structopt(long, env = "RATE_LIMIT", default_value = "5")]
    rate_limit: usize,
    #[structopt(long, env = "SLEEP_TIME_MS", default_value = "2000")]
    sleep_time_ms: u64,
    #[structopt(long, env = "DEBUG", default_value = "false", parse(try_from_str = parse_flag))]
    debug: bool,
    #[structopt(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,
}

fn parse_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("invalid flag value `{}`", other)),
    }
}

//./target/release/window-counter --backup-file backup --rate-limit 5 --sleep-time-ms 2000
//BACKUP_FILE=/tmp/backup DEBUG=1 ./target/release/window-counter

// ab -n 5000 -c 20 "http://127.0.0.1:8080/requests"
// curl "http://127.0.0.1:8080/status"

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::from_args();

    let (level, log_level) = if options.debug {
        (slog::Level::Debug, log::Level::Debug)
    } else {
        (slog::Level::Info, log::Level::Info)
    };
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let logger = slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")));

    // converts log to slog
    let _scope_guard = slog_scope::set_global_logger(logger.clone());
    slog_stdlog::init_with_level(log_level)?;

    let cfg = Config {
        filename: options.backup_file,
        gate_capacity: options.rate_limit,
        request_delay: Duration::from_millis(options.sleep_time_ms),
        ..Default::default()
    };
    info!(logger, "config: {:?}", cfg);

    let (counter, dump_worker) = Counter::open(cfg);
    let dump_handle = tokio::spawn(dump_worker.run());
    let compactor_handle = tokio::spawn(counter.compactor().run());

    let signal_logger = logger.clone();
    let (addr, server) = warp::serve(routes(counter.clone())).try_bind_with_graceful_shutdown(
        options.listen_addr,
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(signal_logger, "failed to listen for ctrl-c, {:?}", e);
                futures::future::pending::<()>().await;
            }
        },
    )?;
    info!(logger, "listening on {}", addr);
    server.await;

    info!(logger, "server has quit");
    compactor_handle.abort();
    counter.shutdown().await?;
    dump_handle.await?;
    Ok(())
}
