use logoworld_core::AgentError;
use thiserror::Error;

/// Failures while writing or reading an exported world.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The input does not follow the export layout.
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },
    #[error(transparent)]
    World(#[from] AgentError),
}

impl StorageError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        StorageError::Format {
            line,
            message: message.into(),
        }
    }
}
