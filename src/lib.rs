//! # ttywatch
//!
//! Observation and synchronization primitives for driving interactive
//! terminal programs.
//!
//! A program running in a PTY produces one undifferentiated byte stream.
//! ttywatch turns that stream into something a test or automation script can
//! act on without sleeping and hoping:
//!
//! - [`classify`] tokenizes raw output into [`Event`]s: text, CSI sequences,
//!   `\r`/`\n`, and escapes it does not recognise.
//! - [`watch`] taps a reader and fires a one-shot [`PromptSignal`] the moment
//!   a prompt appears, even when it arrives split across reads.
//! - [`SequenceDriver`] writes a script into a [`Session`], echoes its output
//!   lines, notices a completion sentinel and bounds the run with a
//!   [`RunContext`] deadline.
//! - [`classify_exit`] turns the session's termination and the context's
//!   state into an exit code and a readable report.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use ttywatch::{PtySession, RunContext, SpawnOptions, SequenceDriver, classify_exit};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = RunContext::background().with_timeout(Duration::from_secs(15));
//!     let mut session = PtySession::spawn(&SpawnOptions::new("sh"))?;
//!
//!     let driver = SequenceDriver::new("echo working; echo [[DONE]]; exit 0", "[[DONE]]");
//!     let result = driver.run(&mut session, &ctx).await;
//!
//!     let wait_err = match result {
//!         Ok(()) => None,
//!         Err(ttywatch::SequenceError::Wait(err)) => Some(err),
//!         Err(err) => return Err(err.into()),
//!     };
//!     let (code, report) = classify_exit(ctx.err(), wait_err.as_ref());
//!     print!("{report}");
//!     std::process::exit(code);
//! }
//! ```
//!
//! ## Classifying output
//!
//! ```
//! use ttywatch::{classify, EventKind};
//!
//! let kinds: Vec<EventKind> = classify("A\r\n\x1b[?25lC".as_bytes())
//!     .map(|event| event.map(|e| e.kind()))
//!     .collect::<std::io::Result<_>>()
//!     .unwrap();
//! assert_eq!(
//!     kinds,
//!     [EventKind::Text, EventKind::Control, EventKind::Control, EventKind::Ansi, EventKind::Text]
//! );
//! ```

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod exit;
pub mod line_reader;
pub mod pty;
pub mod sequence;
pub mod session;
pub mod testing;
pub mod watcher;

pub use classifier::{Events, classify};
pub use context::{Interruption, RunContext};
pub use error::{ExitError, PromptError, SequenceError, WaitError};
pub use event::{Event, EventKind};
pub use exit::{ExitOutcome, SequenceOutcome, classify_exit};
pub use pty::{PtySession, SpawnOptions};
pub use sequence::{Completion, SequenceDriver, run_sequence};
pub use session::{Session, SharedWriter};
pub use watcher::{PromptSignal, PromptWatcher, watch};
