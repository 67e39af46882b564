//! Daemon wiring and the trigger dispatch loop.
//!
//! Long-lived workers: the blocking FIFO listener thread, the idle-shutdown
//! monitor task, and the dispatch loop on the main task. Commands are routed
//! by message; the recording flag is owned exclusively by the dispatch loop,
//! so no turn state is shared across threads. Only one turn is ever in
//! flight — the loop processes commands strictly one at a time.

use crate::config::AssistantConfig;
use crate::conversation::ConversationStore;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::server::ServerManager;
use crate::speech::{CommandCapture, CommandSpeaker, Speaker, SpeechCapture};
use crate::trigger::{TriggerCommand, TriggerListener};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The assembled assistant daemon.
pub struct Assistant {
    config: AssistantConfig,
    conversation: Arc<Mutex<ConversationStore>>,
    server: Arc<ServerManager>,
    llm: LlmClient,
    capture: Arc<dyn SpeechCapture>,
    speaker: Arc<dyn Speaker>,
}

impl Assistant {
    /// Build the daemon with the default subprocess-backed speech
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be constructed.
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let capture = Arc::new(CommandCapture::new(&config.speech));
        let speaker = Arc::new(CommandSpeaker::new(&config.speech));
        Self::with_speech(config, capture, speaker)
    }

    /// Build the daemon with caller-supplied speech collaborators.
    ///
    /// This is the seam front-ends and tests use to substitute the
    /// out-of-scope capture/synthesis stages.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be constructed.
    pub fn with_speech(
        config: AssistantConfig,
        capture: Arc<dyn SpeechCapture>,
        speaker: Arc<dyn Speaker>,
    ) -> Result<Self> {
        let conversation = Arc::new(Mutex::new(ConversationStore::open(
            &config.conversation.history_path,
            &config.conversation.system_prompt,
        )));
        let server = Arc::new(ServerManager::new(config.server.clone())?);
        let llm = LlmClient::new(
            config.llm.clone(),
            Arc::clone(&server),
            Arc::clone(&conversation),
        )?;
        Ok(Self {
            config,
            conversation,
            server,
            llm,
            capture,
            speaker,
        })
    }

    /// Run the daemon until interrupted.
    ///
    /// Spawns the listener thread and the idle monitor, then dispatches
    /// trigger commands until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns an error if the control pipe cannot be created or the
    /// listener thread cannot be spawned.
    pub async fn run(self) -> Result<()> {
        let (tx, rx) = mpsc::channel(16);
        let listener = TriggerListener::create(&self.config.trigger)?;
        listener.spawn(tx)?;
        Arc::clone(&self.server).spawn_idle_monitor(Arc::clone(&self.conversation));

        info!("assistant ready");
        tokio::select! {
            () = self.dispatch(rx) => {}
            _ = tokio::signal::ctrl_c() => info!("interrupt received; shutting down"),
        }
        Ok(())
    }

    /// Dispatch loop: exclusive owner of the recording flag.
    async fn dispatch(&self, mut rx: mpsc::Receiver<TriggerCommand>) {
        let mut recording = false;
        while let Some(command) = rx.recv().await {
            match command {
                TriggerCommand::Toggle => self.handle_toggle(&mut recording).await,
                TriggerCommand::Stop => {
                    info!("stop command received");
                    self.server.stop(Some(&self.conversation));
                }
                TriggerCommand::Unknown(command) => {
                    warn!(%command, "unknown trigger command");
                }
            }
        }
    }

    async fn handle_toggle(&self, recording: &mut bool) {
        *recording = !*recording;
        if *recording {
            info!("recording started");
            if let Err(e) = self.capture.begin().await {
                warn!("cannot start capture: {e}");
                *recording = false;
            }
        } else {
            info!("recording stopped; processing turn");
            self.process_turn().await;
        }
    }

    /// One full turn: transcript → query → spoken reply.
    ///
    /// Transcription always precedes the inference call, which always
    /// precedes speech output. Failures are logged; the loop stays alive.
    async fn process_turn(&self) {
        let transcript = match self.capture.finish().await {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("capture failed: {e}");
                return;
            }
        };
        let Some(text) = transcript else {
            info!("nothing captured; skipping turn");
            return;
        };
        info!(%text, "transcript");

        let reply = self.llm.send_query(&text).await;
        info!(%reply, "assistant reply");

        if let Err(e) = self.speaker.speak(&reply).await {
            warn!("speech output failed: {e}");
        }
    }
}
