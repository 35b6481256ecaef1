//! Error types for ttywatch.

use crate::context::Interruption;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why waiting for a session's process did not report a clean exit.
#[derive(Error, Debug)]
pub enum WaitError {
    /// The process terminated with a non-zero status or a signal
    #[error(transparent)]
    Exit(#[from] ExitError),

    /// Waiting itself failed; no exit status is available
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WaitError {
    /// The structured exit status, if the process actually terminated.
    pub fn exit(&self) -> Option<&ExitError> {
        match self {
            WaitError::Exit(exit) => Some(exit),
            WaitError::Other(_) => None,
        }
    }
}

/// A process exit that was not a clean `exit 0`.
///
/// Carries the exit code and, on platforms with signals, the name of the
/// signal that killed the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(.code, .signal))]
pub struct ExitError {
    code: u32,
    signal: Option<String>,
}

fn describe(code: &u32, signal: &Option<String>) -> String {
    match signal {
        Some(signal) => format!("signal: {signal}"),
        None => format!("exit status {code}"),
    }
}

impl ExitError {
    /// An ordinary exit with `code`.
    pub fn with_code(code: u32) -> Self {
        ExitError { code, signal: None }
    }

    /// Termination by the named signal. The exit code is reported as 1.
    pub fn with_signal(signal: impl Into<String>) -> Self {
        ExitError {
            code: 1,
            signal: Some(signal.into()),
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    /// Name of the terminating signal. Always `None` where signals do not exist.
    #[cfg(unix)]
    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    /// Name of the terminating signal. Always `None` where signals do not exist.
    #[cfg(not(unix))]
    pub fn signal(&self) -> Option<&str> {
        None
    }
}

impl From<portable_pty::ExitStatus> for ExitError {
    fn from(status: portable_pty::ExitStatus) -> Self {
        ExitError {
            code: status.exit_code(),
            signal: status.signal().map(str::to_owned),
        }
    }
}

/// Errors from [`SequenceDriver::run`](crate::SequenceDriver::run).
#[derive(Error, Debug)]
pub enum SequenceError {
    /// The session's output stream could not be attached
    #[error("failed to attach to session output: {0}")]
    Attach(#[source] io::Error),

    /// Writing the script to the session failed
    #[error("failed to write sequence to session: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    /// The process did not exit cleanly
    #[error("sequence wait failed: {0}")]
    Wait(#[source] WaitError),

    /// The governing context was cancelled or hit its deadline first
    #[error("sequence interrupted: {0}")]
    Interrupted(Interruption),
}

/// Errors from waiting on a [`PromptSignal`](crate::PromptSignal).
#[derive(Error, Debug)]
pub enum PromptError {
    /// The pattern did not appear in time
    #[error("prompt {pattern:?} not found within {timeout:?}")]
    Timeout { pattern: String, timeout: Duration },
}
