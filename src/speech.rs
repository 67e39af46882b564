//! Speech collaborator seams.
//!
//! Capture, transcription, and synthesis are external collaborators, not
//! part of this daemon: these traits are the boundary, and the provided
//! implementations shell out to whatever tools the host already has
//! (`arecord` + `whisper-cli`, `festival --tts` by default). A front-end
//! embedding the daemon can substitute its own implementations.

use crate::config::SpeechConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// One recording bracket: `begin` starts capture, `finish` ends it and
/// yields the transcript.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Start capturing microphone audio.
    async fn begin(&self) -> Result<()>;

    /// Stop capturing and transcribe. `None` when nothing usable was
    /// captured.
    async fn finish(&self) -> Result<Option<String>>;
}

/// Speaks assistant replies.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Render `text` as speech, blocking until playback is handed off.
    async fn speak(&self, text: &str) -> Result<()>;
}

/// An in-flight recording.
struct CaptureSession {
    child: Child,
    wav_path: PathBuf,
}

/// Subprocess-backed capture: a recorder child writes a temp WAV until
/// terminated, then a transcriber command turns the WAV into text on stdout.
pub struct CommandCapture {
    capture_cmd: Vec<String>,
    transcribe_cmd: Vec<String>,
    session: tokio::sync::Mutex<Option<CaptureSession>>,
}

impl CommandCapture {
    /// Build from the configured argv vectors.
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            capture_cmd: config.capture_cmd.clone(),
            transcribe_cmd: config.transcribe_cmd.clone(),
            session: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl SpeechCapture for CommandCapture {
    async fn begin(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            warn!("capture already in progress; ignoring begin");
            return Ok(());
        }
        let (program, args) = split_argv(&self.capture_cmd)?;
        let wav_path = std::env::temp_dir().join(format!("hark-capture-{}.wav", std::process::id()));
        let child = Command::new(program)
            .args(args)
            .arg(&wav_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AssistantError::Speech(format!("cannot spawn recorder {program}: {e}")))?;
        debug!(wav = %wav_path.display(), "recorder started");
        *session = Some(CaptureSession { child, wav_path });
        Ok(())
    }

    async fn finish(&self) -> Result<Option<String>> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(None);
        };
        // SIGTERM, not kill: the recorder must finalize the WAV header.
        if let Some(pid) = session.child.id() {
            // SAFETY: plain kill(2); no memory is involved.
            unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        }
        let _ = session.child.wait().await;

        let (program, args) = split_argv(&self.transcribe_cmd)?;
        let output = Command::new(program)
            .args(args)
            .arg(&session.wav_path)
            .output()
            .await;
        let _ = std::fs::remove_file(&session.wav_path);

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("cannot run transcriber {program}: {e}");
                return Ok(None);
            }
        };
        if !output.status.success() {
            warn!(status = %output.status, "transcriber failed");
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if text.is_empty() {
            info!("no speech captured");
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

/// Subprocess-backed synthesis: text is piped into the TTS command's stdin.
pub struct CommandSpeaker {
    speak_cmd: Vec<String>,
}

impl CommandSpeaker {
    /// Build from the configured argv vector.
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            speak_cmd: config.speak_cmd.clone(),
        }
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let (program, args) = split_argv(&self.speak_cmd)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AssistantError::Speech(format!("cannot spawn TTS {program}: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| AssistantError::Speech(format!("cannot feed TTS: {e}")))?;
        }
        let status = child
            .wait()
            .await
            .map_err(|e| AssistantError::Speech(format!("TTS wait failed: {e}")))?;
        if !status.success() {
            warn!(%status, "TTS command exited unsuccessfully");
        }
        Ok(())
    }
}

/// Split an argv vector into program and arguments.
fn split_argv(argv: &[String]) -> Result<(&String, &[String])> {
    argv.split_first()
        .ok_or_else(|| AssistantError::Config("empty speech command".to_owned()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn split_argv_rejects_empty_command() {
        assert!(split_argv(&[]).is_err());
        let argv = vec!["festival".to_owned(), "--tts".to_owned()];
        let (program, args) = split_argv(&argv).unwrap();
        assert_eq!(program, "festival");
        assert_eq!(args, ["--tts".to_owned()]);
    }

    #[tokio::test]
    async fn speaker_pipes_text_to_command() {
        // `cat` consumes stdin and exits zero.
        let speaker = CommandSpeaker {
            speak_cmd: vec!["cat".to_owned()],
        };
        speaker.speak("hello").await.expect("speak");
    }

    #[tokio::test]
    async fn speaker_missing_command_errors() {
        let speaker = CommandSpeaker {
            speak_cmd: vec!["hark-definitely-not-a-real-tts".to_owned()],
        };
        assert!(speaker.speak("hello").await.is_err());
    }

    #[tokio::test]
    async fn finish_without_begin_is_none() {
        let capture = CommandCapture::new(&SpeechConfig::default());
        let transcript = capture.finish().await.expect("finish");
        assert!(transcript.is_none());
    }
}
