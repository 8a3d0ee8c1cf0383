use std::path::PathBuf;

pub type GenResult<T> = std::result::Result<T, GenError>;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("failed to read corpus {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("corpus block {block} is not valid utf-8")]
    Decode {
        block: usize,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("no text element could be placed")]
    NothingPlaced,
}

impl GenError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GenError::InvalidArgument(message.into())
    }

    /// Failures caused by an unlucky random draw rather than bad input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenError::InvalidArgument(_) | GenError::NothingPlaced)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenError::Io {
            path: path.into(),
            source,
        }
    }
}
