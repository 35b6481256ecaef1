//! Classification of how a driven process ended.
//!
//! [`ExitOutcome`] records the independent facts about a termination: the
//! child's exit code, the signal that killed it, whether the governing
//! [`RunContext`](crate::RunContext) had already been interrupted, and any
//! raw error text. A process killed *because* its context was cancelled has
//! both a signal and an interruption; [`ExitOutcome::kind`] and
//! [`ExitOutcome::report`] decide how to present that.

use crate::context::Interruption;
use crate::error::WaitError;
use std::fmt::Write as _;

/// The single headline verdict for a run, derived from an [`ExitOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The process ended on its own with exit code 0
    Completed,
    /// The process exited with a non-zero code
    ExitedNonZero { code: u32 },
    /// The process was terminated by a signal
    Signalled { signal: String },
    /// The governing context was cancelled or hit its deadline
    Interrupted { cause: Interruption },
    /// Waiting failed without producing an exit status
    Failed { message: String },
}

/// Everything known about how a process terminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    /// The error text reported by the wait, if it failed.
    pub error: Option<String>,
    /// The child's own exit code, when it exited with a status.
    pub child_code: Option<u32>,
    /// Name of the terminating signal, on platforms that have signals.
    pub signal: Option<String>,
    /// Set if the context had ended by the time the wait returned.
    pub interruption: Option<Interruption>,
}

impl ExitOutcome {
    /// Collect the facts from a context's error state and a wait result.
    pub fn new(interruption: Option<Interruption>, wait_err: Option<&WaitError>) -> Self {
        let Some(err) = wait_err else {
            return ExitOutcome {
                interruption,
                ..ExitOutcome::default()
            };
        };

        let exit = err.exit();
        ExitOutcome {
            error: Some(err.to_string()),
            child_code: exit.map(|exit| exit.code()),
            signal: exit.and_then(|exit| exit.signal()).map(str::to_owned),
            interruption,
        }
    }

    /// The exit code for the driver itself: 0 only when the child succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.error.is_some() { 1 } else { 0 }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// The headline verdict. Interruption outranks a signal, which outranks
    /// a plain non-zero exit.
    pub fn kind(&self) -> SequenceOutcome {
        let Some(error) = &self.error else {
            return SequenceOutcome::Completed;
        };
        if let Some(cause) = self.interruption {
            return SequenceOutcome::Interrupted { cause };
        }
        if let Some(signal) = &self.signal {
            return SequenceOutcome::Signalled {
                signal: signal.clone(),
            };
        }
        match self.child_code {
            Some(code) => SequenceOutcome::ExitedNonZero { code },
            None => SequenceOutcome::Failed {
                message: error.clone(),
            },
        }
    }

    /// Human-readable, multi-line account of the termination.
    pub fn report(&self) -> String {
        let mut report = String::from("\n--- Wait Result ---\n");
        let Some(error) = &self.error else {
            report.push_str("\nProcess finished naturally.\n");
            report.push_str("Process exited successfully with code 0.\n");
            return report;
        };

        let _ = writeln!(report, "Error: {error}");
        if let Some(code) = self.child_code {
            let _ = writeln!(report, "Exit code: {code}");
        }
        if let Some(signal) = &self.signal {
            let _ = writeln!(report, "Terminated by signal: {signal}");
        }
        if let Some(cause) = self.interruption {
            let _ = writeln!(report, "Process was interrupted ({cause}).");
        }
        report
    }
}

/// Turn a context's error state and a wait result into a driver exit code
/// and a report.
///
/// `interruption` must come from the context itself
/// ([`RunContext::err`](crate::RunContext::err)) rather than be guessed from
/// the exit code.
pub fn classify_exit(interruption: Option<Interruption>, wait_err: Option<&WaitError>) -> (i32, String) {
    let outcome = ExitOutcome::new(interruption, wait_err);
    (outcome.exit_code(), outcome.report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitError;

    #[test]
    fn test_clean_exit() {
        let (code, report) = classify_exit(None, None);
        assert_eq!(code, 0);
        assert!(report.contains("finished naturally"));
        assert!(report.contains("exited successfully"));
        assert_eq!(ExitOutcome::new(None, None).kind(), SequenceOutcome::Completed);
    }

    #[test]
    fn test_non_zero_exit() {
        let err = WaitError::from(ExitError::with_code(127));
        let (code, report) = classify_exit(None, Some(&err));
        assert_eq!(code, 1);
        assert!(report.contains("Exit code: 127"));
        assert!(report.contains("Error: exit status 127"));
        assert!(!report.contains("interrupted"));
        assert!(!report.contains("finished naturally"));
        assert_eq!(
            ExitOutcome::new(None, Some(&err)).kind(),
            SequenceOutcome::ExitedNonZero { code: 127 }
        );
    }

    #[test]
    fn test_cancelled_exit() {
        let err = WaitError::from(ExitError::with_code(1));
        let (code, report) = classify_exit(Some(Interruption::Cancelled), Some(&err));
        assert_eq!(code, 1);
        assert!(report.contains("Exit code: 1"));
        assert!(report.contains("Process was interrupted (cancelled)."));
    }

    #[test]
    fn test_deadline_exit() {
        let err = WaitError::from(ExitError::with_code(2));
        let outcome = ExitOutcome::new(Some(Interruption::DeadlineExceeded), Some(&err));
        assert!(outcome.report().contains("interrupted (deadline exceeded)"));
        assert_eq!(
            outcome.kind(),
            SequenceOutcome::Interrupted {
                cause: Interruption::DeadlineExceeded
            }
        );
    }

    #[test]
    fn test_interruption_is_read_from_context_not_code() {
        // Exit code 130 looks like SIGINT but nothing was cancelled.
        let err = WaitError::from(ExitError::with_code(130));
        let (_, report) = classify_exit(None, Some(&err));
        assert!(!report.contains("interrupted"));
    }

    #[test]
    fn test_generic_failure() {
        let err = WaitError::from(anyhow::anyhow!("pty transport closed"));
        let outcome = ExitOutcome::new(None, Some(&err));
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.report().contains("Error: pty transport closed"));
        assert!(!outcome.report().contains("Exit code"));
        assert_eq!(
            outcome.kind(),
            SequenceOutcome::Failed {
                message: "pty transport closed".to_string()
            }
        );
    }

    #[test]
    fn test_generic_failure_with_interruption() {
        let err = WaitError::from(anyhow::anyhow!("wait aborted"));
        let (code, report) = classify_exit(Some(Interruption::Cancelled), Some(&err));
        assert_eq!(code, 1);
        assert!(report.contains("Error: wait aborted"));
        assert!(report.contains("Process was interrupted"));
    }

    #[test]
    fn test_interruption_without_error_is_still_success() {
        let (code, report) = classify_exit(Some(Interruption::Cancelled), None);
        assert_eq!(code, 0);
        assert!(report.contains("finished naturally"));
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_and_interruption_both_reported() {
        let err = WaitError::from(ExitError::with_signal("Killed"));
        let outcome = ExitOutcome::new(Some(Interruption::Cancelled), Some(&err));
        let report = outcome.report();
        assert!(report.contains("Terminated by signal: Killed"));
        assert!(report.contains("Process was interrupted (cancelled)."));
        assert_eq!(
            outcome.kind(),
            SequenceOutcome::Interrupted {
                cause: Interruption::Cancelled
            }
        );
        assert_eq!(outcome.signal.as_deref(), Some("Killed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_without_interruption() {
        let err = WaitError::from(ExitError::with_signal("Terminated"));
        assert_eq!(
            ExitOutcome::new(None, Some(&err)).kind(),
            SequenceOutcome::Signalled {
                signal: "Terminated".to_string()
            }
        );
    }

    #[cfg(not(unix))]
    #[test]
    fn test_no_signal_line_without_signals() {
        let err = WaitError::from(ExitError::with_signal("Killed"));
        let (_, report) = classify_exit(None, Some(&err));
        assert!(!report.contains("Terminated by signal"));
    }
}
