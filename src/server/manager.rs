//! Lifecycle state machine for the inference-server subprocess.
//!
//! Two observable states: stopped and running. A stale PID record (file
//! present, process dead) collapses to stopped at the next liveness check.
//! The critical invariant is at most one managed server process at a time:
//! `start` is a logged no-op whenever the record reconciles to a live PID.

use crate::config::ServerConfig;
use crate::conversation::ConversationStore;
use crate::error::{AssistantError, Result};
use crate::server::pid_file::PidFile;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-probe timeout for `/health` requests.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a `start` readiness wait.
///
/// `Unconfirmed` means the window elapsed without a healthy response but the
/// process was left running with its PID record intact: large models can
/// out-load any fixed window, and a later query will fail fast if the server
/// truly never came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The health endpoint answered within the readiness window.
    Confirmed,
    /// The window elapsed; the server is assumed to still be loading.
    Unconfirmed,
}

/// Owns the inference-server subprocess lifecycle and idle policy.
pub struct ServerManager {
    config: ServerConfig,
    pid_file: PidFile,
    /// Instant of the most recent query dispatch; read by the idle monitor.
    last_query: Mutex<Instant>,
    http: reqwest::Client,
}

impl ServerManager {
    /// Create a manager for the server described by `config`.
    ///
    /// `last_query` is reset to now, so a freshly constructed manager never
    /// immediately idle-stops a server inherited from a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP probe client cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::Server(format!("cannot build HTTP client: {e}")))?;
        let pid_file = PidFile::new(&config.pid_file);
        Ok(Self {
            config,
            pid_file,
            last_query: Mutex::new(Instant::now()),
            http,
        })
    }

    /// Server configuration this manager was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Base URL of the managed server.
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Whether a managed server process is currently alive.
    ///
    /// Sole source of truth: the PID record reconciled against a signal-0
    /// liveness probe. Never errors — absent, malformed, and stale records
    /// all read as not running.
    pub fn is_running(&self) -> bool {
        self.pid_file.reconcile().is_some()
    }

    /// Start the server unless one is already running.
    ///
    /// Spawns the binary detached (own process group, null stdio) with the
    /// fixed launch arguments, records the PID *before* readiness is
    /// confirmed so a crash during warm-up is still observable, then polls
    /// `GET /health` until success or the window elapses.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process cannot be spawned or the PID
    /// record cannot be written. A readiness timeout is not an error; see
    /// [`Readiness::Unconfirmed`].
    pub async fn start(&self) -> Result<Readiness> {
        if self.is_running() {
            info!("inference server already running");
            return Ok(Readiness::Confirmed);
        }

        info!(
            model = %self.config.model_path.display(),
            port = self.config.port,
            "starting inference server; loading model to VRAM"
        );
        let mut command = std::process::Command::new(&self.config.bin_path);
        command
            .arg("-m")
            .arg(&self.config.model_path)
            .arg("-t")
            .arg(self.config.threads.to_string())
            .arg("-ngl")
            .arg(self.config.gpu_layers.to_string())
            .arg("--port")
            .arg(self.config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group: the server outlives this daemon and must not
        // receive its terminal signals.
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = command.spawn().map_err(|e| {
            AssistantError::Server(format!(
                "cannot spawn {}: {e}",
                self.config.bin_path.display()
            ))
        })?;
        let pid = child.id();
        self.pid_file.write(pid)?;
        // Never waited on; the process runs detached.
        drop(child);
        info!(pid, "inference server spawned");

        let health_url = format!("{}/health", self.config.base_url());
        for attempt in 1..=self.config.health_poll_attempts {
            tokio::time::sleep(self.config.health_poll_interval()).await;
            match self.http.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, "inference server ready to accept queries");
                    return Ok(Readiness::Confirmed);
                }
                Ok(response) => {
                    debug!(status = %response.status(), "health probe not ready");
                }
                Err(e) => debug!("health probe failed: {e}"),
            }
        }
        warn!(
            attempts = self.config.health_poll_attempts,
            "inference server did not report ready within the window; \
             assuming it is still loading"
        );
        Ok(Readiness::Unconfirmed)
    }

    /// Stop the server and reset conversation memory.
    ///
    /// When a store is supplied it is cleared (keeping the system message)
    /// before the process is touched, whether or not a server is actually
    /// running — stop means "reset the assistant", not merely "kill the
    /// process". Signal delivery and record removal failures are logged and
    /// swallowed; `stop` never propagates an error.
    pub fn stop(&self, conversation: Option<&Mutex<ConversationStore>>) {
        if let Some(conversation) = conversation {
            conversation
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear(true);
            info!("conversation history cleared");
        }

        if !self.is_running() {
            info!("no inference server running");
            return;
        }

        let Some(pid) = self.pid_file.read() else {
            return;
        };
        info!(pid, "stopping inference server");
        // SAFETY: plain kill(2); no memory is involved.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!(
                pid,
                "cannot deliver SIGTERM: {}",
                std::io::Error::last_os_error()
            );
        }
        if let Err(e) = self.pid_file.remove() {
            warn!("cannot remove PID record: {e}");
        }
        info!("inference server stopped; reserved VRAM released");
    }

    /// Mark now as the most recent query dispatch.
    pub fn touch(&self) {
        *self.last_query.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Time elapsed since the most recent query dispatch.
    pub fn idle_elapsed(&self) -> Duration {
        self.last_query
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// One idle-monitor tick: stop the server iff it is running and has been
    /// idle beyond the configured window. Returns whether a stop was issued.
    pub fn idle_tick(&self, conversation: Option<&Mutex<ConversationStore>>) -> bool {
        if self.is_running() && self.idle_elapsed() > self.config.idle_shutdown() {
            info!(
                idle_secs = self.idle_elapsed().as_secs(),
                "inference server idle too long; shutting it down"
            );
            self.stop(conversation);
            true
        } else {
            false
        }
    }

    /// Spawn the idle-shutdown monitor task.
    ///
    /// Ticks forever at the configured cadence. This is the only path that
    /// stops the server without an explicit stop command.
    pub fn spawn_idle_monitor(
        self: Arc<Self>,
        conversation: Arc<Mutex<ConversationStore>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let cadence = Duration::from_secs(self.config.idle_poll_interval_secs);
            loop {
                tokio::time::sleep(cadence).await;
                self.idle_tick(Some(&conversation));
            }
        })
    }
}
