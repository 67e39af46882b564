//! Managed inference-server lifecycle.
//!
//! The inference server is a detached llama.cpp-style subprocess tracked
//! through a durable PID record. It is started lazily on first query,
//! health-polled until ready, and retired after a configurable idle window
//! so VRAM is only held while the assistant is actually in use.

mod manager;
mod pid_file;

pub use manager::{Readiness, ServerManager};
pub use pid_file::{PidFile, probe};
