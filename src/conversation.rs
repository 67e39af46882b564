//! Conversation history: an ordered message log with synchronous persistence.
//!
//! The store owns the full conversation and rewrites its single JSON record
//! on every mutation. At voice-conversation sizes a full rewrite is cheap,
//! and a crash between mutation and persistence loses at most the last
//! message.
//!
//! Invariant: index 0 is always the `system` message. `clear` with
//! `keep_system` truncates to that single element.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona/instruction preamble, always at index 0.
    System,
    /// Transcribed user utterance.
    User,
    /// Model reply.
    Assistant,
}

impl Role {
    /// Wire/record label for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message. Immutable once appended.
///
/// This shape doubles as the chat-completions wire format, so the persisted
/// record can be sent to the server verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message author.
    pub role: Role,
    /// Message text, whitespace-trimmed at append time.
    pub content: String,
}

/// Durable, ordered conversation log.
pub struct ConversationStore {
    path: PathBuf,
    messages: Vec<Message>,
}

impl ConversationStore {
    /// Open the store at `path`, loading the persisted history if present.
    ///
    /// An absent, unreadable, or empty record silently falls back to a
    /// single-element conversation seeded with `system_prompt` — corruption
    /// is never surfaced as an error.
    pub fn open(path: impl Into<PathBuf>, system_prompt: &str) -> Self {
        let path = path.into();
        let messages = match load_history(&path) {
            Some(messages) if !messages.is_empty() => {
                debug!(count = messages.len(), "loaded conversation history");
                messages
            }
            _ => vec![Message {
                role: Role::System,
                content: system_prompt.trim().to_owned(),
            }],
        };
        Self { path, messages }
    }

    /// Append a message and persist the full record.
    ///
    /// `content` is whitespace-trimmed. Persistence failures are logged and
    /// swallowed; the in-memory log is authoritative for the session.
    pub fn append(&mut self, role: Role, content: &str) {
        self.messages.push(Message {
            role,
            content: content.trim().to_owned(),
        });
        self.persist();
    }

    /// Truncate the conversation and persist.
    ///
    /// With `keep_system` the system message at index 0 is retained;
    /// otherwise the log is emptied entirely and the caller must re-seed it
    /// before the next turn.
    pub fn clear(&mut self, keep_system: bool) {
        if keep_system {
            self.messages.truncate(1);
        } else {
            self.messages.clear();
        }
        self.persist();
    }

    /// Retract the trailing message iff it is an unanswered user turn.
    ///
    /// Used by the failed-turn policy so a request failure can leave no
    /// trace in context.
    pub fn retract_trailing_user(&mut self) {
        if self.messages.last().map(|m| m.role) == Some(Role::User) {
            self.messages.pop();
            self.persist();
        }
    }

    /// The full ordered message sequence.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the log.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty (only after `clear(false)`).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("cannot create history dir {}: {e}", parent.display());
                return;
            }
        }
        let json = match serde_json::to_string_pretty(&self.messages) {
            Ok(json) => json,
            Err(e) => {
                warn!("cannot serialize conversation history: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!("cannot write history {}: {e}", self.path.display());
        }
    }
}

/// Read and parse the history record. `None` on absence or corruption.
fn load_history(path: &Path) -> Option<Vec<Message>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("cannot read history {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(messages) => Some(messages),
        Err(e) => {
            warn!("corrupt history {}; starting fresh: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn temp_store(name: &str) -> ConversationStore {
        let dir = std::env::temp_dir().join("hark-test-conversation").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        ConversationStore::open(dir.join("history.json"), "You are a test assistant.")
    }

    #[test]
    fn fresh_store_seeds_system_message() {
        let store = temp_store("fresh");
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].role, Role::System);
        assert_eq!(store.messages()[0].content, "You are a test assistant.");
    }

    #[test]
    fn append_preserves_call_order() {
        let mut store = temp_store("order");
        store.append(Role::User, "first");
        store.append(Role::Assistant, "second");
        store.append(Role::User, "third");

        let roles: Vec<Role> = store.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(store.messages()[3].content, "third");
    }

    #[test]
    fn append_trims_whitespace() {
        let mut store = temp_store("trim");
        store.append(Role::User, "  hello there \n");
        assert_eq!(store.messages()[1].content, "hello there");
    }

    #[test]
    fn clear_keep_system_leaves_single_system_message() {
        let mut store = temp_store("clear-keep");
        store.append(Role::User, "one");
        store.append(Role::Assistant, "two");
        store.clear(true);

        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].role, Role::System);
    }

    #[test]
    fn clear_without_system_empties_log() {
        let mut store = temp_store("clear-all");
        store.append(Role::User, "one");
        store.clear(false);
        assert!(store.is_empty());
    }

    #[test]
    fn retract_trailing_user_pops_only_user_turns() {
        let mut store = temp_store("retract");
        store.append(Role::User, "unanswered");
        store.retract_trailing_user();
        assert_eq!(store.len(), 1);

        store.append(Role::User, "question");
        store.append(Role::Assistant, "answer");
        store.retract_trailing_user();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn role_labels() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn role_serde_is_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
