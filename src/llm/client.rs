//! One-request-per-turn chat client with lazy server warm-up.

use crate::config::LlmConfig;
use crate::conversation::{ConversationStore, Role};
use crate::error::{AssistantError, Result};
use crate::llm::protocol::{ChatCompletionRequest, ChatCompletionResponse};
use crate::server::{Readiness, ServerManager};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Fixed user-facing reply when a request fails for any reason.
pub const FALLBACK_REPLY: &str = "Error encountered while processing request.";

/// Issues chat completion requests against the managed server.
pub struct LlmClient {
    config: LlmConfig,
    server: Arc<ServerManager>,
    conversation: Arc<Mutex<ConversationStore>>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a client over `server` and `conversation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: LlmConfig,
        server: Arc<ServerManager>,
        conversation: Arc<Mutex<ConversationStore>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Llm(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            config,
            server,
            conversation,
            http,
        })
    }

    /// Run one turn: ensure the server is up, append the user message, post
    /// the full conversation, append and return the cleaned reply.
    ///
    /// Warm-up is lazy — a cold start blocks here for up to the readiness
    /// window. `last_query` is touched unconditionally, even when the
    /// request subsequently fails, so a merely-slow server is not
    /// thrash-restarted by the idle monitor.
    ///
    /// Never fails outward: any failure is logged and reduced to
    /// [`FALLBACK_REPLY`]. Whether the unanswered user message stays in
    /// history is governed by `retain_failed_user_turns`.
    pub async fn send_query(&self, prompt: &str) -> String {
        match self.dispatch(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("LLM request failed: {e}");
                if !self.config.retain_failed_user_turns {
                    self.conversation
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .retract_trailing_user();
                }
                FALLBACK_REPLY.to_owned()
            }
        }
    }

    async fn dispatch(&self, prompt: &str) -> Result<String> {
        if !self.server.is_running() {
            if let Readiness::Unconfirmed = self.server.start().await? {
                info!("proceeding with query against unconfirmed server");
            }
        }
        self.server.touch();

        let request = {
            let mut conversation = self.conversation.lock().unwrap_or_else(|e| e.into_inner());
            conversation.append(Role::User, prompt);
            ChatCompletionRequest {
                model: self.config.model_name.clone(),
                messages: conversation.messages().to_vec(),
                temperature: self.config.temperature,
            }
        };

        let url = format!("{}/v1/chat/completions", self.server.base_url());
        info!("sending query to inference server");
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::Llm(format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| AssistantError::Llm(format!("server returned error: {e}")))?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Llm(format!("malformed response: {e}")))?;

        let raw = body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| AssistantError::Llm("response carried no choices".to_owned()))?;

        let reply = clean_for_speech(raw);
        self.conversation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(Role::Assistant, &reply);
        info!("LLM response received");
        Ok(reply)
    }
}

/// Prepare generated text for the speech stage.
///
/// Drops a leading reasoning block when both `<think>` and `</think>` are
/// present (keeping only the text after the closing marker), then strips
/// formatting that is meaningless when spoken: asterisks, heading markers,
/// horizontal rules.
pub fn clean_for_speech(text: &str) -> String {
    let text = match (text.find("<think>"), text.find("</think>")) {
        (Some(_), Some(end)) => &text[end + "</think>".len()..],
        _ => text,
    };
    text.replace('*', "")
        .replace("###", "")
        .replace("---", "")
        .trim()
        .to_owned()
}
