//! The [`Session`] trait: a running program attached to a terminal.

use crate::error::WaitError;
use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// A session's input stream, shareable with a thread that may block on it.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// A program whose terminal output can be read and whose input can be written.
///
/// Implemented by [`PtySession`](crate::PtySession) for real programs and by
/// [`MockSession`](crate::testing::MockSession) for tests. The observation
/// primitives in this crate only borrow a session; spawning, killing and
/// closing it is up to the caller.
#[async_trait]
pub trait Session: Send {
    /// A reader over the program's terminal output.
    ///
    /// Reads block until the program writes or the terminal closes, so the
    /// reader is normally drained on a background thread.
    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// The program's terminal input.
    ///
    /// Writes can block when the program stops draining its input, so a
    /// caller bounded by a deadline should write from a helper thread.
    fn writer(&self) -> SharedWriter;

    /// Wait for the program to terminate.
    ///
    /// Returns `Ok(())` for a clean `exit 0`. Cancel-safe: dropping the
    /// future and calling `wait` again observes the same termination.
    async fn wait(&mut self) -> Result<(), WaitError>;

    /// Forcefully terminate the program.
    fn kill(&mut self) -> io::Result<()>;

    /// OS process id, when the platform exposes one.
    fn pid(&self) -> Option<u32> {
        None
    }
}
