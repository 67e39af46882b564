//! Control-pipe listener.
//!
//! Window-manager keybinds drive the assistant by writing literal command
//! lines into a FIFO (`echo toggle > /tmp/hark.pipe`). A dedicated OS thread
//! blocks on the pipe and forwards parsed commands into an async channel;
//! the dispatch loop in [`crate::runtime`] consumes them one at a time.

use crate::config::TriggerConfig;
use crate::error::{AssistantError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A command read from the control pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Flip the recording state; a transition to off runs one full turn.
    Toggle,
    /// Stop the inference server and reset conversation memory.
    Stop,
    /// Anything else; logged by the dispatcher, no effect.
    Unknown(String),
}

impl TriggerCommand {
    /// Parse one pipe line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "toggle" => Some(Self::Toggle),
            "stop" => Some(Self::Stop),
            other => Some(Self::Unknown(other.to_owned())),
        }
    }
}

/// Why one open-read cycle of the pipe ended.
enum PumpExit {
    /// All writers closed the pipe; reopen immediately.
    WritersClosed,
    /// The command channel is gone; the daemon is shutting down.
    DispatcherGone,
}

/// Blocking FIFO reader feeding the dispatch loop.
pub struct TriggerListener {
    pipe_path: PathBuf,
    reopen_delay: Duration,
}

impl TriggerListener {
    /// Create the control FIFO and a listener over it.
    ///
    /// Any existing file at the pipe path is removed first so a stale
    /// regular file from a crashed run cannot wedge the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the FIFO cannot be created.
    pub fn create(config: &TriggerConfig) -> Result<Self> {
        let pipe_path = config.pipe_path.clone();
        if pipe_path.exists() {
            std::fs::remove_file(&pipe_path)?;
        }
        mkfifo(&pipe_path)?;
        Ok(Self {
            pipe_path,
            reopen_delay: config.reopen_delay(),
        })
    }

    /// Spawn the listener on a named OS thread.
    ///
    /// The thread runs until the receiving side of `tx` is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(
        self,
        tx: mpsc::Sender<TriggerCommand>,
    ) -> Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("trigger-listener".into())
            .spawn(move || self.run(&tx))
            .map_err(|e| AssistantError::Trigger(format!("cannot spawn listener thread: {e}")))
    }

    fn run(&self, tx: &mpsc::Sender<TriggerCommand>) {
        info!(pipe = %self.pipe_path.display(), "listening for trigger commands");
        loop {
            match self.pump(tx) {
                Ok(PumpExit::WritersClosed) => {}
                Ok(PumpExit::DispatcherGone) => return,
                Err(e) => {
                    warn!("control pipe error: {e}");
                    std::thread::sleep(self.reopen_delay);
                }
            }
        }
    }

    /// One open-read cycle: blocks until a writer appears, then forwards
    /// each parsed line until EOF or error.
    fn pump(&self, tx: &mpsc::Sender<TriggerCommand>) -> std::io::Result<PumpExit> {
        let pipe = File::open(&self.pipe_path)?;
        for line in BufReader::new(pipe).lines() {
            let Some(command) = TriggerCommand::parse(&line?) else {
                continue;
            };
            if tx.blocking_send(command).is_err() {
                return Ok(PumpExit::DispatcherGone);
            }
        }
        Ok(PumpExit::WritersClosed)
    }
}

/// Create a FIFO at `path`, readable and writable by the owner only.
fn mkfifo(path: &std::path::Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| AssistantError::Trigger(format!("pipe path contains NUL: {}", path.display())))?;
    // SAFETY: c_path is a valid NUL-terminated string for the call's duration.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(AssistantError::Trigger(format!(
            "cannot create FIFO {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
