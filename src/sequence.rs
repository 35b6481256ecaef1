//! Scripted command sequences with a completion sentinel.
//!
//! A [`SequenceDriver`] writes a script into a session as a single line,
//! echoes every output line to a handler, and marks [`Completion`] when a
//! line equal to the sentinel shows up. The session's exit is authoritative
//! for when the run ends; the sentinel is only an observation.

use crate::context::{Interruption, RunContext};
use crate::error::SequenceError;
use crate::line_reader::spawn_line_reader;
use crate::session::{Session, SharedWriter};
use log::{debug, trace};
use std::io::{self, Write};
use std::sync::{Arc, PoisonError};
use std::thread;
use tokio::sync::{oneshot, watch};

type LineHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Drives one scripted exchange with a session.
pub struct SequenceDriver {
    script: String,
    sentinel: String,
    line_handler: LineHandler,
    completed: Arc<watch::Sender<bool>>,
}

impl SequenceDriver {
    /// Create a driver that sends `script` and watches for `sentinel`.
    ///
    /// Output lines are printed to stdout until
    /// [`with_line_handler`](Self::with_line_handler) replaces the handler.
    pub fn new(script: impl Into<String>, sentinel: impl Into<String>) -> Self {
        let (completed, _) = watch::channel(false);
        SequenceDriver {
            script: script.into(),
            sentinel: sentinel.into(),
            line_handler: Arc::new(|line: &str| println!("{line}")),
            completed: Arc::new(completed),
        }
    }

    /// Send every output line to `handler` instead of stdout.
    pub fn with_line_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.line_handler = Arc::new(handler);
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Handle on the "sentinel seen" flag.
    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.completed.subscribe(),
        }
    }

    /// Run the sequence against `session`.
    ///
    /// Returns `Ok(())` when the process exits cleanly. A failed write is
    /// returned as [`SequenceError::Write`], an unclean exit as
    /// [`SequenceError::Wait`] carrying the session's error unchanged. If
    /// `ctx` ends first, whether during the write or the wait,
    /// [`SequenceError::Interrupted`] is returned and the process is left
    /// running for the caller to kill.
    pub async fn run<S>(&self, session: &mut S, ctx: &RunContext) -> Result<(), SequenceError>
    where
        S: Session + ?Sized,
    {
        let reader = session.take_reader().map_err(SequenceError::Attach)?;

        let handler = self.line_handler.clone();
        let sentinel = self.sentinel.clone();
        let completed = self.completed.clone();
        // Detached: the reader lives until the output stream closes.
        let _reader = spawn_line_reader(reader, move |line| {
            handler(line);
            if line.trim() == sentinel {
                trace!("sentinel {sentinel:?} seen");
                completed.send_if_modified(|done| !std::mem::replace(done, true));
            }
        });

        let payload = format!("{}\r\n", self.script);
        debug!("writing sequence ({} bytes)", payload.len());
        tokio::select! {
            result = write_detached(session.writer(), payload.into_bytes()) => {
                result.map_err(|source| SequenceError::Write { source })?
            }
            cause = ctx.done() => return Err(interrupted("write", cause)),
        }

        tokio::select! {
            result = session.wait() => result.map_err(SequenceError::Wait),
            cause = ctx.done() => Err(interrupted("wait", cause)),
        }
    }
}

fn interrupted(stage: &str, cause: Interruption) -> SequenceError {
    debug!("sequence interrupted during {stage}: {cause}");
    SequenceError::Interrupted(cause)
}

/// Write `payload` from a helper thread so a stalled input stream only
/// blocks that thread. An abandoned write finishes or fails on its own,
/// typically once the process is killed.
async fn write_detached(writer: SharedWriter, payload: Vec<u8>) -> io::Result<()> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = writer.write_all(&payload).and_then(|()| writer.flush());
        let _ = tx.send(result);
    });
    rx.await
        .unwrap_or_else(|_| Err(io::Error::other("writer thread exited without a result")))
}

/// Whether a [`SequenceDriver`] has seen its sentinel.
#[derive(Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the sentinel has been seen.
    ///
    /// Returns `false` if the driver was dropped without seeing it.
    pub async fn wait(&mut self) -> bool {
        self.rx.wait_for(|done| *done).await.is_ok()
    }
}

/// Run `script` against `session`, forwarding output lines to `sink`.
///
/// Shorthand for [`SequenceDriver::run`] when the completion flag is not needed.
pub async fn run_sequence<S, F>(
    session: &mut S,
    script: &str,
    sentinel: &str,
    ctx: &RunContext,
    sink: F,
) -> Result<(), SequenceError>
where
    S: Session + ?Sized,
    F: Fn(&str) + Send + Sync + 'static,
{
    SequenceDriver::new(script, sentinel)
        .with_line_handler(sink)
        .run(session, ctx)
        .await
}
