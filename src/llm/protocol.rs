//! OpenAI-compatible chat completion wire types.
//!
//! Only the subset the client consumes. [`Message`] doubles as the wire
//! message shape, so the conversation log is sent verbatim.

use crate::conversation::Message;
use serde::{Deserialize, Serialize};

/// Chat completion request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Full conversation so far, system message first.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Chat completion response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Completion choices; the client reads the first.
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// A single completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// The generated message.
    pub message: Message,
}
