use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path conflict at {path}: {reason}")]
    PathConflict { path: String, reason: String },

    #[error("decode failed: {0}")]
    DecodeFailure(String),

    #[error("save incomplete: {written} written, {failed} failed")]
    PartialSaveFailure { written: usize, failed: usize },

    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

/// Coarse classification used when an error has to be shown in place of content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PathConflict,
    DecodeFailure,
    PartialSaveFailure,
    ConfigurationMissing,
    Io,
}

impl PreviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreviewError::NotFound(_) => ErrorKind::NotFound,
            PreviewError::PathConflict { .. } => ErrorKind::PathConflict,
            PreviewError::DecodeFailure(_) | PreviewError::Format(_) => ErrorKind::DecodeFailure,
            PreviewError::PartialSaveFailure { .. } => ErrorKind::PartialSaveFailure,
            PreviewError::ConfigurationMissing(_) | PreviewError::InvalidParam(_) => {
                ErrorKind::ConfigurationMissing
            }
            PreviewError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            PreviewError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        PreviewError::DecodeFailure(msg.into())
    }
}

impl From<image::ImageError> for PreviewError {
    fn from(e: image::ImageError) -> Self {
        PreviewError::DecodeFailure(e.to_string())
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, PreviewError>;
