use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the persistent store or its notification bus.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored document is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("change bus closed")]
    BusClosed,
}

/// Rejections raised locally before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("no favorite with id {0}")]
    UnknownFavorite(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("image could not be loaded: {0}")]
    ImageLoad(String),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("no qr symbol found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("qr encoding failed: {0}")]
    Encode(String),
    #[error("browser request failed: {0}")]
    Browser(String),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
