//! Chat completion client for the managed inference server.
//!
//! One synchronous request per turn against the server's OpenAI-compatible
//! `/v1/chat/completions` endpoint, carrying the full conversation so far.

mod client;
mod protocol;

pub use client::{FALLBACK_REPLY, LlmClient, clean_for_speech};
pub use protocol::{ChatCompletionRequest, ChatCompletionResponse, Choice};
