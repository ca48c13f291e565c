use thiserror::Error;

/// Unified error type for the multipeer relay.
#[derive(Error, Debug)]
pub enum MultipeerError {
    // ── Native boundary errors ─────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("native layer dropped the completion without answering")]
    CompletionDropped,

    #[error("connection has been disposed")]
    Disposed,

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl MultipeerError {
    /// Whether this error came from the native layer rather than the relay itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MultipeerError::Transport(_) | MultipeerError::CompletionDropped
        )
    }
}

pub type Result<T> = std::result::Result<T, MultipeerError>;
