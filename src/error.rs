use std::io;

/// Errors in rustbucket
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bucket parameters rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Caller passed an argument the bucket cannot honor, e.g. zero permits.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A blocking wait was interrupted before it could finish.
    #[error("Acquisition cancelled")]
    Cancelled,
    #[error("Fail to encode configuration: {0}")]
    Encode(String),
    #[error("Fail to decode configuration: {0}")]
    Decode(String),
    #[error("Filesys I/O: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            Category::Io => Error::Io(e.into()),
            _ => Error::Decode(e.to_string()),
        }
    }
}
