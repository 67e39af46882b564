//! Error types for the hark daemon.

/// Top-level error type for the voice-assistant daemon.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Inference-server lifecycle error.
    #[error("server error: {0}")]
    Server(String),

    /// Language-model request error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech capture or synthesis error.
    #[error("speech error: {0}")]
    Speech(String),

    /// Control-channel error.
    #[error("trigger error: {0}")]
    Trigger(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
