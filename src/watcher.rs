//! Prompt detection on a live output stream.
//!
//! [`watch`] wraps a reader in a transparent tap. Every byte that passes
//! through is appended to a buffer, and the first time the buffer contains
//! the pattern the paired [`PromptSignal`] fires. The signal fires once; it
//! stays raised for every later observer.
//!
//! The usual arrangement is a background copy loop draining the watcher
//! while the orchestrating task waits on the signal:
//!
//! ```no_run
//! # async fn demo(reader: Box<dyn std::io::Read + Send>) -> anyhow::Result<()> {
//! use std::time::Duration;
//!
//! let (mut watcher, signal) = ttywatch::watch(reader, "What is your name? ");
//! std::thread::spawn(move || std::io::copy(&mut watcher, &mut std::io::stdout()));
//! signal.wait_timeout(Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::PromptError;
use log::debug;
use memchr::memmem;
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::watch as flag;

/// Wrap `source` so that reads through it are checked for `pattern`.
///
/// Returns the wrapped reader and the signal that fires when the pattern
/// first appears in the bytes read so far.
pub fn watch<R>(source: R, pattern: impl Into<Vec<u8>>) -> (PromptWatcher<R>, PromptSignal) {
    let (found, _) = flag::channel(false);
    let shared = Arc::new(Shared {
        pattern: pattern.into(),
        state: Mutex::new(State::default()),
        found,
    });
    let watcher = PromptWatcher {
        inner: source,
        shared: shared.clone(),
    };
    (watcher, PromptSignal { shared })
}

struct Shared {
    pattern: Vec<u8>,
    state: Mutex<State>,
    found: flag::Sender<bool>,
}

#[derive(Default)]
struct State {
    buffer: Vec<u8>,
    found: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append freshly read bytes and raise the signal on the first match.
    fn record(&self, data: &[u8]) {
        let mut state = self.lock();
        let searched = state.buffer.len();
        state.buffer.extend_from_slice(data);
        if state.found {
            return;
        }

        // Only the region that could hold a match ending in `data` is new.
        let start = searched.saturating_sub(self.pattern.len().saturating_sub(1));
        if memmem::find(&state.buffer[start..], &self.pattern).is_some() {
            state.found = true;
            debug!(
                "prompt {:?} found after {} bytes",
                String::from_utf8_lossy(&self.pattern),
                state.buffer.len()
            );
            self.found.send_replace(true);
        }
    }
}

/// Pass-through reader that feeds a [`PromptSignal`]. Created by [`watch`].
///
/// Reads return exactly what the wrapped source returns. The source is not
/// closed when the watcher is dropped beyond dropping `R` itself.
pub struct PromptWatcher<R> {
    inner: R,
    shared: Arc<Shared>,
}

impl<R> PromptWatcher<R> {
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PromptWatcher<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.shared.record(&buf[..n]);
        }
        Ok(n)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PromptWatcher<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let fresh = &buf.filled()[before..];
            if !fresh.is_empty() {
                this.shared.record(fresh);
            }
        }
        result
    }
}

/// One-shot notification that a watched pattern has appeared.
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Clone)]
pub struct PromptSignal {
    shared: Arc<Shared>,
}

impl PromptSignal {
    /// The pattern this signal is waiting for.
    pub fn pattern(&self) -> &[u8] {
        &self.shared.pattern
    }

    /// Whether the pattern has been seen yet.
    pub fn is_found(&self) -> bool {
        *self.shared.found.borrow()
    }

    /// Resolve once the pattern has been seen. Pending forever if it never is.
    pub async fn found(&self) {
        let mut rx = self.shared.found.subscribe();
        if rx.wait_for(|found| *found).await.is_err() {
            // The sender lives in `shared`, which we hold; it cannot close.
            std::future::pending::<()>().await;
        }
    }

    /// Wait for the pattern, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), PromptError> {
        tokio::time::timeout(timeout, self.found())
            .await
            .map_err(|_| PromptError::Timeout {
                pattern: String::from_utf8_lossy(&self.shared.pattern).into_owned(),
                timeout,
            })
    }

    /// Everything read through the watcher so far.
    pub fn transcript(&self) -> Vec<u8> {
        self.shared.lock().buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::io::AsyncWriteExt;

    /// Returns one scripted chunk per read.
    struct Chunks(VecDeque<&'static [u8]>);

    impl Chunks {
        fn new(chunks: &[&'static [u8]]) -> Self {
            Chunks(chunks.iter().copied().collect())
        }
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_prompt_in_single_read() {
        let (mut watcher, signal) = watch(&b"some data before prompt: and after"[..], "prompt: ");
        assert!(!signal.is_found());
        io::copy(&mut watcher, &mut io::sink()).unwrap();
        assert!(signal.is_found());
    }

    #[test]
    fn test_prompt_split_across_reads() {
        let (mut watcher, signal) = watch(
            Chunks::new(&[b"some data before pro", b"mpt: and after"]),
            "prompt: ",
        );
        let mut buf = [0u8; 64];

        watcher.read(&mut buf).unwrap();
        assert!(!signal.is_found());

        watcher.read(&mut buf).unwrap();
        assert!(signal.is_found());
    }

    #[test]
    fn test_pattern_spanning_many_reads() {
        let (mut watcher, signal) = watch(Chunks::new(&[b"$", b" ", b"r", b"e", b"ady>"]), "$ ready>");
        io::copy(&mut watcher, &mut io::sink()).unwrap();
        assert!(signal.is_found());
    }

    #[test]
    fn test_pass_through_is_transparent() {
        let input = b"\x1b[32mLogin: \x1b[0m";
        let (mut watcher, _signal) = watch(&input[..], "Login: ");
        let mut out = Vec::new();
        watcher.read_to_end(&mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_errors_pass_through() {
        let (mut watcher, signal) = watch(Broken, "x");
        let err = watcher.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(!signal.is_found());
    }

    #[test]
    fn test_transcript_keeps_everything() {
        let (mut watcher, signal) = watch(Chunks::new(&[b"one ", b"two ", b"three"]), "two");
        io::copy(&mut watcher, &mut io::sink()).unwrap();
        assert_eq!(signal.transcript(), b"one two three");
    }

    #[tokio::test]
    async fn test_signal_fires_for_background_copy() {
        let (mut watcher, signal) = watch(
            Chunks::new(&[b"some data before pro", b"mpt: and after"]),
            "prompt: ",
        );
        std::thread::spawn(move || io::copy(&mut watcher, &mut io::sink()));

        signal.wait_timeout(Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_never_fires_without_pattern() {
        let (mut watcher, signal) = watch(&b"some other data"[..], "prompt: ");
        std::thread::spawn(move || io::copy(&mut watcher, &mut io::sink()));

        let err = signal.wait_timeout(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, PromptError::Timeout { .. }));
        assert!(!signal.is_found());
    }

    #[tokio::test]
    async fn test_late_observer_sees_raised_signal() {
        let (mut watcher, signal) = watch(&b"prompt: prompt: prompt: "[..], "prompt: ");
        io::copy(&mut watcher, &mut io::sink()).unwrap();

        let late = signal.clone();
        late.wait_timeout(Duration::from_millis(10)).await.unwrap();
        signal.found().await;
    }

    #[tokio::test]
    async fn test_async_source() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let (mut watcher, signal) = watch(rx, "Password: ");

        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut watcher, &mut out)
                .await
                .map(|_| out)
        });

        tx.write_all(b"ssh host\r\nPass").await.unwrap();
        tx.write_all(b"word: ").await.unwrap();
        signal.wait_timeout(Duration::from_secs(1)).await.unwrap();
        drop(tx);

        let out = reader.await.unwrap().unwrap();
        assert_eq!(out, b"ssh host\r\nPassword: ");
    }
}
