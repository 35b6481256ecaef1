//! A scriptable in-memory [`Session`] for tests.
//!
//! ```
//! use ttywatch::testing::MockSession;
//! use ttywatch::{ExitError, RunContext, run_sequence};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut session = MockSession::new("hello\r\n").exit_with(ExitError::with_code(3));
//! let err = run_sequence(&mut session, "echo hello", "[[DONE]]", &RunContext::background(), |_| {})
//!     .await
//!     .unwrap_err();
//! assert!(err.to_string().contains("exit status 3"));
//! # }
//! ```

use crate::error::{ExitError, WaitError};
use crate::session::{Session, SharedWriter};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
enum Outcome {
    Success,
    Exit(ExitError),
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitGate {
    Immediate,
    Eof,
    Kill,
}

/// In-memory stand-in for a program in a PTY.
///
/// Output is served from scripted chunks, one chunk per read. Input is
/// captured in a shared buffer. By default `wait` returns at once with a
/// clean exit; the builder methods change when and how it returns.
pub struct MockSession {
    output: Option<VecDeque<Vec<u8>>>,
    input: Arc<Mutex<Vec<u8>>>,
    writer: Arc<Mutex<MockWriter>>,
    outcome: Outcome,
    gate: WaitGate,
    eof: Arc<watch::Sender<bool>>,
    killed: Arc<watch::Sender<bool>>,
}

impl MockSession {
    /// A session whose output is `output` in a single chunk.
    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self::with_chunks([output.into()])
    }

    /// A session whose output arrives as the given chunks, one per read.
    pub fn with_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let input = Arc::new(Mutex::new(Vec::new()));
        MockSession {
            output: Some(
                chunks
                    .into_iter()
                    .map(Into::into)
                    .filter(|chunk: &Vec<u8>| !chunk.is_empty())
                    .collect(),
            ),
            writer: Arc::new(Mutex::new(MockWriter {
                sink: input.clone(),
                error: None,
                stall: None,
            })),
            input,
            outcome: Outcome::Success,
            gate: WaitGate::Immediate,
            eof: Arc::new(watch::channel(false).0),
            killed: Arc::new(watch::channel(false).0),
        }
    }

    /// `wait` reports this exit instead of success.
    pub fn exit_with(mut self, exit: ExitError) -> Self {
        self.outcome = Outcome::Exit(exit);
        self
    }

    /// `wait` fails without an exit status.
    pub fn fail_wait(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Failure(message.into());
        self
    }

    /// Every write fails with `kind`.
    pub fn fail_writes(self, kind: io::ErrorKind) -> Self {
        self.mock_writer().error = Some(kind);
        self
    }

    /// Every write sleeps for `delay` before it is accepted, like a
    /// program that has stopped reading its input.
    pub fn stall_writes(self, delay: Duration) -> Self {
        self.mock_writer().stall = Some(delay);
        self
    }

    /// `wait` blocks until the output reader has hit end of stream.
    pub fn wait_for_eof(mut self) -> Self {
        self.gate = WaitGate::Eof;
        self
    }

    /// `wait` blocks until [`Session::kill`] is called.
    pub fn wait_for_kill(mut self) -> Self {
        self.gate = WaitGate::Kill;
        self
    }

    /// Everything written to the session so far.
    pub fn input(&self) -> Arc<Mutex<Vec<u8>>> {
        self.input.clone()
    }

    pub fn was_killed(&self) -> bool {
        *self.killed.borrow()
    }

    fn mock_writer(&self) -> MutexGuard<'_, MockWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Session for MockSession {
    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let chunks = self
            .output
            .take()
            .ok_or_else(|| io::Error::other("output already taken"))?;
        Ok(Box::new(MockReader {
            chunks,
            eof: self.eof.clone(),
        }))
    }

    fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    async fn wait(&mut self) -> Result<(), WaitError> {
        let gate = match self.gate {
            WaitGate::Immediate => None,
            WaitGate::Eof => Some(self.eof.subscribe()),
            WaitGate::Kill => Some(self.killed.subscribe()),
        };
        if let Some(mut rx) = gate {
            // Both senders are owned by `self`, so this cannot observe a close.
            let _ = rx.wait_for(|open| *open).await;
        }

        if self.was_killed() {
            return Err(ExitError::with_signal("Killed").into());
        }
        match &self.outcome {
            Outcome::Success => Ok(()),
            Outcome::Exit(exit) => Err(exit.clone().into()),
            Outcome::Failure(message) => Err(anyhow!("{message}").into()),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed.send_replace(true);
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        Some(1234)
    }
}

struct MockReader {
    chunks: VecDeque<Vec<u8>>,
    eof: Arc<watch::Sender<bool>>,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            self.eof.send_replace(true);
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }
}

struct MockWriter {
    sink: Arc<Mutex<Vec<u8>>>,
    error: Option<io::ErrorKind>,
    stall: Option<Duration>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(delay) = self.stall {
            thread::sleep(delay);
        }
        if let Some(kind) = self.error {
            return Err(io::Error::new(kind, "mocked write error"));
        }
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_serves_chunks_then_eof() {
        let mut session = MockSession::with_chunks(["ab", "c"]);
        let mut reader = session.take_reader().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(session.take_reader().is_err());
    }

    #[test]
    fn test_writes_are_captured() {
        let session = MockSession::new("");
        session.writer().lock().unwrap().write_all(b"World\r\n").unwrap();
        assert_eq!(session.input().lock().unwrap().as_slice(), b"World\r\n");
    }

    #[test]
    fn test_forced_write_error() {
        let session = MockSession::new("").fail_writes(io::ErrorKind::BrokenPipe);
        let err = session.writer().lock().unwrap().write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_stalled_write_still_lands() {
        let session = MockSession::new("").stall_writes(Duration::from_millis(20));
        let started = std::time::Instant::now();
        session.writer().lock().unwrap().write_all(b"late").unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(session.input().lock().unwrap().as_slice(), b"late");
    }

    #[tokio::test]
    async fn test_kill_releases_wait_with_signal() {
        let mut session = MockSession::new("").wait_for_kill();
        session.kill().unwrap();
        let err = session.wait().await.unwrap_err();
        let exit = err.exit().unwrap();
        assert_eq!(exit.to_string(), "signal: Killed");
    }

    #[tokio::test]
    async fn test_wait_outcomes() {
        assert!(MockSession::new("").wait().await.is_ok());

        let err = MockSession::new("")
            .exit_with(ExitError::with_code(127))
            .wait()
            .await
            .unwrap_err();
        assert_eq!(err.exit().map(ExitError::code), Some(127));

        let err = MockSession::new("").fail_wait("boom").wait().await.unwrap_err();
        assert!(err.exit().is_none());
        assert_eq!(err.to_string(), "boom");
    }
}
