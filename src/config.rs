//! Configuration types for the assistant daemon.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Inference-server lifecycle settings.
    pub server: ServerConfig,
    /// Chat completion settings.
    pub llm: LlmConfig,
    /// Conversation history settings.
    pub conversation: ConversationConfig,
    /// Control-pipe settings.
    pub trigger: TriggerConfig,
    /// Speech capture / synthesis collaborator commands.
    pub speech: SpeechConfig,
}

/// Inference-server lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path to the server binary (e.g. llama.cpp's `llama-server`).
    ///
    /// A bare name is resolved through `PATH` at spawn time.
    pub bin_path: PathBuf,
    /// Path to the GGUF model file passed via `-m`.
    pub model_path: PathBuf,
    /// Port the server listens on.
    pub port: u16,
    /// CPU thread count passed via `-t`.
    pub threads: u32,
    /// GPU layer offload count passed via `-ngl`.
    pub gpu_layers: u32,
    /// Path of the durable PID record.
    ///
    /// This file plus a liveness probe on the recorded PID is the sole
    /// source of truth for "is the server running", and survives restarts
    /// of the daemon itself.
    pub pid_file: PathBuf,
    /// Interval between readiness probes during start, in milliseconds.
    pub health_poll_interval_ms: u64,
    /// Maximum number of readiness probes before giving up on confirmation.
    pub health_poll_attempts: u32,
    /// Cadence of the idle-shutdown monitor, in seconds.
    pub idle_poll_interval_secs: u64,
    /// Idle duration after which the server is stopped to release VRAM,
    /// in seconds.
    pub idle_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from("llama-server"),
            model_path: default_data_dir().join("models").join("model.gguf"),
            port: 8080,
            threads: 16,
            gpu_layers: 999,
            pid_file: default_data_dir().join("llama-server.pid"),
            health_poll_interval_ms: 1_000,
            health_poll_attempts: 60,
            idle_poll_interval_secs: 60,
            idle_shutdown_secs: 600,
        }
    }
}

impl ServerConfig {
    /// Base URL of the managed server.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Interval between readiness probes.
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    /// Idle window after which the server is eligible for shutdown.
    pub fn idle_shutdown(&self) -> Duration {
        Duration::from_secs(self.idle_shutdown_secs)
    }
}

/// Chat completion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier sent in the request body.
    pub model_name: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion request timeout in seconds.
    ///
    /// Large-model generation is slow; an in-flight response must not be
    /// abandoned mid-generation.
    pub request_timeout_secs: u64,
    /// Whether a user message is kept in history when its request fails.
    ///
    /// When `true` (matching the behavior this daemon replaces), a failed
    /// turn leaves the unanswered user message in context and it is resent
    /// with every subsequent request. When `false`, the message is retracted
    /// so failed turns leave no trace.
    pub retain_failed_user_turns: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model_name: "Qwen3-32B-UD-Q6_K_XL.gguf".to_owned(),
            temperature: 0.7,
            request_timeout_secs: 120,
            retain_failed_user_turns: true,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Path of the persisted history record.
    pub history_path: PathBuf,
    /// System message seeded at index 0 of every fresh conversation.
    pub system_prompt: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_path: default_data_dir().join("history.json"),
            system_prompt: "You are a concise and friendly AI assistant that gives \
                            answers without emojis."
                .to_owned(),
        }
    }
}

/// Control-pipe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Path of the FIFO that window-manager keybinds write command lines to.
    pub pipe_path: PathBuf,
    /// Delay before reopening the pipe after an I/O error, in milliseconds.
    pub reopen_delay_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            pipe_path: PathBuf::from("/tmp/hark.pipe"),
            reopen_delay_ms: 500,
        }
    }
}

impl TriggerConfig {
    /// Backoff applied before retrying a failed pipe open/read.
    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }
}

/// Speech collaborator commands.
///
/// The recorder command receives the output WAV path as its final argument
/// and runs until terminated; the transcriber receives the WAV path as its
/// final argument and prints the transcript on stdout; the speaker reads
/// text on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Microphone capture command (argv).
    pub capture_cmd: Vec<String>,
    /// Speech-to-text command (argv).
    pub transcribe_cmd: Vec<String>,
    /// Text-to-speech command (argv).
    pub speak_cmd: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            capture_cmd: vec![
                "arecord".to_owned(),
                "-q".to_owned(),
                "-f".to_owned(),
                "S16_LE".to_owned(),
                "-r".to_owned(),
                "48000".to_owned(),
                "-c".to_owned(),
                "1".to_owned(),
            ],
            transcribe_cmd: vec![
                "whisper-cli".to_owned(),
                "-nt".to_owned(),
                "-f".to_owned(),
            ],
            speak_cmd: vec!["festival".to_owned(), "--tts".to_owned()],
        }
    }
}

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/hark/` by default. Override with the
/// `HARK_DATA_DIR` environment variable.
pub fn default_data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HARK_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("hark"))
        .unwrap_or_else(|| PathBuf::from("/tmp/hark-data"))
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/hark/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("hark").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("hark")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/hark-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.server.port > 0);
        assert!(config.server.threads > 0);
        assert!(config.server.health_poll_attempts > 0);
        assert!(config.server.health_poll_interval_ms > 0);
        assert!(config.server.idle_shutdown_secs > 0);
        assert!(!config.llm.model_name.is_empty());
        assert!(config.llm.temperature >= 0.0);
        assert!(config.llm.request_timeout_secs > 0);
        assert!(config.llm.retain_failed_user_turns);
        assert!(!config.conversation.system_prompt.is_empty());
        assert!(config.trigger.reopen_delay_ms > 0);
        assert!(!config.speech.speak_cmd.is_empty());
    }

    #[test]
    fn base_url_uses_configured_port() {
        let mut server = ServerConfig::default();
        server.port = 9123;
        assert_eq!(server.base_url(), "http://127.0.0.1:9123");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("hark-test-config-roundtrip");
        let path = dir.join("config.toml");

        let mut config = AssistantConfig::default();
        config.server.port = 9090;
        config.llm.temperature = 1.2;
        config.conversation.system_prompt = "Answer in one sentence.".to_owned();

        assert!(config.save_to_file(&path).is_ok());
        assert!(path.exists());

        let loaded = AssistantConfig::from_file(&path).expect("load should succeed");
        assert_eq!(loaded.server.port, 9090);
        assert!((loaded.llm.temperature - 1.2).abs() < f64::EPSILON);
        assert_eq!(loaded.conversation.system_prompt, "Answer in one sentence.");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result =
            AssistantConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: AssistantConfig =
            toml::from_str("[server]\nport = 1234\n").expect("parse partial config");
        assert_eq!(parsed.server.port, 1234);
        // Everything else falls back to defaults.
        assert_eq!(parsed.server.health_poll_attempts, 60);
        assert_eq!(parsed.llm.request_timeout_secs, 120);
        assert_eq!(parsed.trigger.reopen_delay_ms, 500);
    }
}
