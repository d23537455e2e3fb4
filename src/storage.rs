use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::Timestamp;

/// Separator between serialized timestamps in the event log.
pub const DELIMITER: &str = ",";

/// A trait defining operations on the durable event log.
///
/// The log holds timestamps oldest-to-newest. Implementations guard every operation
/// with a single shared/exclusive lock so that an append and a compaction never
/// interleave.
///
/// # Methods
/// - `read`: Return the whole serialized log.
/// - `overwrite`: Replace the whole log.
/// - `append`: Add one timestamp at the end of the log.
/// - `compact`: Rewrite the log keeping only the entries at or after a cutoff.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns the full content of the log.
    ///
    /// # Returns
    /// Returns `Error::NotFound` when the log does not exist yet and `Error::Empty`
    /// when it exists with no content. Both mean "no prior events".
    async fn read(&self) -> Result<String>;

    /// Replaces the whole log with `content` in a single exclusive write.
    async fn overwrite(&self, content: &str) -> Result<()>;

    /// Appends one timestamp, creating the log if it is absent.
    async fn append(&self, timestamp: Timestamp) -> Result<()>;

    /// Rewrites the log keeping only the entries at or after `cutoff`.
    ///
    /// The read, the scan and the rewrite all happen under the exclusive lock.
    ///
    /// # Returns
    /// Returns the number of entries retained. A missing or empty log retains zero
    /// and is left untouched.
    async fn compact(&self, cutoff: Timestamp) -> Result<usize>;
}

/// A file backed implementation of the `EventStore` trait.
///
/// # Fields
/// - `path`: Location of the backing file.
/// - `lock`: Serializes writers against each other and against readers.
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Creates a store over `path`. The file itself is created on the first write.
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for FileStore {
    #[inline]
    async fn read(&self) -> Result<String> {
        let _guard = self.lock.read().await;
        read_file(&self.path).await
    }

    #[inline]
    async fn overwrite(&self, content: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        write_file(&self.path, content).await
    }

    /// Appends `,<timestamp>` to the backing file.
    ///
    /// The leading delimiter means a fresh file starts with a comma; readers drop the
    /// empty token it produces.
    async fn append(&self, timestamp: Timestamp) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}{}", DELIMITER, timestamp).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    async fn compact(&self, cutoff: Timestamp) -> Result<usize> {
        let _guard = self.lock.write().await;
        let content = match read_file(&self.path).await {
            Ok(content) => content,
            Err(e) if e.is_missing() => {
                debug!("nothing to compact, {}", e);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let fresh = fresh_suffix(&content, cutoff);
        write_file(&self.path, &serialize(&fresh)).await?;
        Ok(fresh.len())
    }
}

async fn read_file(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path).await?;
    if content.is_empty() {
        return Err(Error::Empty);
    }
    Ok(content)
}

/// Replaces the file content. Callers hold the exclusive lock.
async fn write_file(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[inline]
fn parse_timestamp(token: &str) -> Result<Timestamp> {
    token
        .parse::<Timestamp>()
        .map_err(|_| Error::Parse(token.to_owned()))
}

/// Extracts the entries at or after `cutoff` from a serialized log.
///
/// Tokens are scanned newest-to-oldest and the scan stops at the first stale entry,
/// so the cost follows the number of fresh entries rather than the log size. This
/// relies on the log being in arrival order. Empty tokens are ignored and tokens that
/// are not integers are logged and skipped.
///
/// # Returns
/// Returns the fresh entries oldest-to-newest.
pub fn fresh_suffix(content: &str, cutoff: Timestamp) -> Vec<Timestamp> {
    let mut fresh = Vec::new();
    let tokens = content
        .rsplit(DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty());
    for token in tokens {
        match parse_timestamp(token) {
            Ok(timestamp) if timestamp >= cutoff => fresh.push(timestamp),
            Ok(_) => break,
            Err(e) => warn!("skipping backup entry, {}", e),
        }
    }
    fresh.reverse();
    fresh
}

/// Joins timestamps into the on-disk format.
pub fn serialize(timestamps: &[Timestamp]) -> String {
    timestamps
        .iter()
        .map(|timestamp| timestamp.to_string())
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_suffix_stops_at_first_stale_entry() {
        // 50 is out of order; the scan never reaches it
        let fresh = fresh_suffix(",50,90,10,100,110,120", 100);
        assert_eq!(fresh, vec![100, 110, 120]);
    }

    #[test]
    fn fresh_suffix_skips_malformed_tokens() {
        let fresh = fresh_suffix(",100,abc,110,,12x,120,", 95);
        assert_eq!(fresh, vec![100, 110, 120]);
    }

    #[test]
    fn fresh_suffix_of_garbage_is_empty() {
        assert!(fresh_suffix(",,,", 0).is_empty());
        assert!(fresh_suffix("not,a,log", 0).is_empty());
    }

    #[test]
    fn serialize_has_no_leading_delimiter() {
        assert_eq!(serialize(&[1, 2, 3]), "1,2,3");
        assert_eq!(serialize(&[]), "");
    }

    #[tokio::test]
    async fn read_distinguishes_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("backup"));
        assert!(matches!(store.read().await, Err(Error::NotFound)));

        store.overwrite("").await.unwrap();
        assert!(matches!(store.read().await, Err(Error::Empty)));
    }

    #[tokio::test]
    async fn append_creates_file_with_leading_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("backup"));
        store.append(10).await.unwrap();
        store.append(20).await.unwrap();
        assert_eq!(store.read().await.unwrap(), ",10,20");
    }

    #[tokio::test]
    async fn compact_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("backup"));
        store.overwrite(",10,20,x,30,40").await.unwrap();

        assert_eq!(store.compact(25).await.unwrap(), 2);
        let first = store.read().await.unwrap();
        assert_eq!(first, "30,40");

        assert_eq!(store.compact(25).await.unwrap(), 2);
        assert_eq!(store.read().await.unwrap(), first);
    }

    #[tokio::test]
    async fn compact_without_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup");
        let store = FileStore::new(&path);
        assert_eq!(store.compact(0).await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn compact_to_nothing_leaves_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("backup"));
        store.overwrite(",1,2,3").await.unwrap();
        assert_eq!(store.compact(100).await.unwrap(), 0);
        assert!(matches!(store.read().await, Err(Error::Empty)));

        store.append(200).await.unwrap();
        assert_eq!(fresh_suffix(&store.read().await.unwrap(), 100), vec![200]);
    }

    #[tokio::test]
    async fn compacted_log_matches_overwritten_log() {
        let dir = tempfile::tempdir().unwrap();
        let compacted = FileStore::new(dir.path().join("compacted"));
        let overwritten = FileStore::new(dir.path().join("overwritten"));
        for timestamp in [10, 50, 90] {
            compacted.append(timestamp).await.unwrap();
        }
        assert_eq!(compacted.compact(50).await.unwrap(), 2);
        overwritten.overwrite(&serialize(&[50, 90])).await.unwrap();

        assert_eq!(
            compacted.read().await.unwrap(),
            overwritten.read().await.unwrap()
        );
    }
}
