use std::convert::Infallible;

use log::warn;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use crate::counter::Counter;
use crate::storage::EventStore;

/// `/requests` (any method) records a hit and answers the count seen before it.
/// `GET /status` answers the counter's `Status` as JSON.
pub fn routes<S: EventStore + 'static>(
    counter: Counter<S>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let requests = warp::path!("requests")
        .and(with_counter(counter.clone()))
        .and_then(requests::<S>);

    let status = warp::get()
        .and(warp::path!("status"))
        .and(with_counter(counter))
        .and_then(status::<S>);

    requests.or(status)
}

fn with_counter<S: EventStore + 'static>(
    counter: Counter<S>,
) -> impl Filter<Extract = (Counter<S>,), Error = Infallible> + Clone {
    warp::any().map(move || counter.clone())
}

async fn requests<S: EventStore + 'static>(
    counter: Counter<S>,
) -> Result<impl Reply, Infallible> {
    match counter.hit().await {
        Ok(count) => Ok(reply::with_status(
            format!("Request count in the last minute: {}\n", count),
            StatusCode::OK,
        )),
        Err(e) => {
            warn!("request rejected, {:?}", e);
            Ok(reply::with_status(
                format!("{}\n", e),
                StatusCode::SERVICE_UNAVAILABLE,
            ))
        }
    }
}

async fn status<S: EventStore + 'static>(counter: Counter<S>) -> Result<impl Reply, Infallible> {
    Ok(reply::json(&counter.status().await))
}
