use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("backup file not found")]
    NotFound,
    #[error("backup file is empty")]
    Empty,
    #[error("invalid timestamp `{0}`")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("send error, {0}")]
    SendError(String),
    #[error("recv error, {0}")]
    RecvError(String),
    #[error("admission gate closed")]
    Closed,
}

impl Error {
    /// True for the conditions that mean "no prior events" rather than a failure.
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Error::NotFound | Error::Empty)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound,
            _ => Error::Io(e.to_string()),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::SendError(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::RecvError(e.to_string())
    }
}

impl From<tokio::sync::AcquireError> for Error {
    #[inline]
    fn from(_: tokio::sync::AcquireError) -> Self {
        Error::Closed
    }
}
