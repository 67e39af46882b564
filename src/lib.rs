//! Hark: push-to-talk local voice assistant with a managed inference server.
//!
//! A window-manager keybind writes command lines into a control FIFO; the
//! daemon records until the next toggle, transcribes the captured audio,
//! sends the transcript to a locally hosted llama.cpp-style server —
//! spawning it on demand — speaks the reply, and persists the conversation
//! across turns.
//!
//! # Architecture
//!
//! Control flow per turn:
//! Pipe `toggle` → capture bracket → transcript → chat completion → speech
//!
//! - **Trigger**: blocking FIFO reader forwarding commands over a channel
//! - **Conversation**: ordered message log, rewritten to disk per mutation
//! - **Server**: detached subprocess tracked via a durable PID record,
//!   health-polled on start and auto-stopped after an idle window
//! - **LLM client**: one `/v1/chat/completions` request per turn with the
//!   full history, replies cleaned for speech
//! - **Speech**: trait seams over external capture/transcribe/synthesize
//!   commands

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod runtime;
pub mod server;
pub mod speech;
pub mod trigger;

pub use config::AssistantConfig;
pub use conversation::{ConversationStore, Message, Role};
pub use error::{AssistantError, Result};
pub use llm::LlmClient;
pub use runtime::Assistant;
pub use server::{Readiness, ServerManager};
