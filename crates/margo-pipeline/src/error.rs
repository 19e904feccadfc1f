use std::fmt;
use std::io;

use margo_core::Retryable;
use margo_source::SourceError;

/// Failure of a pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    /// The upstream ERP failed; possibly transient.
    Source(SourceError),
    /// Local storage or validation failed; always permanent.
    Storage(io::Error),
    /// A shutdown request arrived before the job could run.
    Interrupted,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "source error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Interrupted => write!(f, "interrupted by shutdown request"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        Self::Storage(e)
    }
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_retryable(),
            Self::Storage(_) | Self::Interrupted => false,
        }
    }
}
