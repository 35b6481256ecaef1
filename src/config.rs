//! Defaults and parsers for command-line configuration.

use anyhow::{Context as _, Result, anyhow};
use std::time::Duration;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// How long `prompt` waits for its prompt before giving up.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a whole `sequence` run.
pub const DEFAULT_SEQUENCE_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest output line the sequence line reader accepts.
pub const MAX_LINE_LEN: usize = 1 << 20;

pub const DEFAULT_READY_MARKER: &str = "[[TTYWATCH_READY]]";
pub const DEFAULT_SENTINEL: &str = "[[TTYWATCH_DONE]]";

/// Parse a duration string: `1s`, `500ms`, `1.5s`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms_str) = s.strip_suffix("ms") {
        let ms: u64 = ms_str
            .trim()
            .parse()
            .context("Invalid milliseconds value")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(s_str) = s.strip_suffix('s') {
        let secs: f64 = s_str.trim().parse().context("Invalid seconds value")?;
        Duration::try_from_secs_f64(secs).context("Invalid seconds value")
    } else {
        Err(anyhow!("Duration must end with 's' or 'ms', got: {}", s))
    }
}

/// Parse a `KEY=VALUE` environment assignment.
pub fn parse_env_pair(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(anyhow!("Expected KEY=VALUE, got: {}", s)),
    }
}
