use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("{tool} not found at '{path}', install FFmpeg or configure its path")]
    ToolMissing { tool: &'static str, path: String },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}): {diagnostics}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        diagnostics: String,
    },

    #[error("Cannot probe {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),
}

impl TranscodeError {
    pub(crate) fn spawn(tool: &'static str, path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            TranscodeError::ToolMissing {
                tool,
                path: path.to_string(),
            }
        } else {
            TranscodeError::Spawn { tool, source }
        }
    }

    pub(crate) fn probe(path: &std::path::Path, reason: impl ToString) -> Self {
        TranscodeError::Probe {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
