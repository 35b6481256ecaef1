use crate::config::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::error::{ExitError, WaitError};
use crate::session::{Session, SharedWriter};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use portable_pty::{ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::path::PathBuf;
use tokio::sync::watch;

/// What to run inside a new PTY and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub dir: Option<PathBuf>,
    /// Extra `KEY=VALUE` pairs added to the inherited environment
    pub env: Vec<(String, String)>,
}

impl SpawnOptions {
    pub fn new(program: impl Into<String>) -> Self {
        SpawnOptions {
            program: program.into(),
            args: Vec::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            dir: None,
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

type ExitSlot = Option<std::result::Result<ExitStatus, String>>;

/// Manages a program running inside a PTY
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    writer: SharedWriter,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
    exit: watch::Receiver<ExitSlot>,
}

impl PtySession {
    /// Spawn a program in a new PTY
    pub fn spawn(options: &SpawnOptions) -> Result<Self> {
        let pty_system = portable_pty::native_pty_system();

        let pty_size = PtySize {
            rows: options.rows,
            cols: options.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(pty_size)
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&options.program);
        cmd.args(&options.args);
        if let Some(dir) = &options.dir {
            cmd.cwd(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", options.program))?;

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let killer = child.clone_killer();
        let pid = child.process_id();
        debug!("spawned {} (pid {:?})", options.program, pid);

        // Reap the child on its own thread so waiting can be raced and retried.
        let (tx, exit) = watch::channel(None);
        std::thread::spawn(move || {
            let status = child.wait().map_err(|err| err.to_string());
            debug!("child {:?} exited: {:?}", pid, status);
            let _ = tx.send(Some(status));
        });

        Ok(PtySession {
            master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            killer,
            pid,
            exit,
        })
    }

    /// Check if the child process is still running
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }
}

#[async_trait]
impl Session for PtySession {
    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        self.master.try_clone_reader().map_err(io::Error::other)
    }

    fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    async fn wait(&mut self) -> std::result::Result<(), WaitError> {
        let mut exit = self.exit.clone();
        let slot = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| anyhow!("child waiter thread exited without a status"))?;

        match &*slot {
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(ExitError::from(status.clone()).into()),
            Some(Err(message)) => Err(anyhow!("failed to wait for child: {message}").into()),
            None => Err(anyhow!("child status missing").into()),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        debug!("killing child {:?}", self.pid);
        self.killer.kill()
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_options_builder() {
        let options = SpawnOptions::new("sh")
            .args(["-c", "echo hi"])
            .size(120, 40)
            .dir("/tmp")
            .env("TERM", "dumb");
        assert_eq!(options.program, "sh");
        assert_eq!(options.args, vec!["-c", "echo hi"]);
        assert_eq!((options.cols, options.rows), (120, 40));
        assert_eq!(options.dir, Some(PathBuf::from("/tmp")));
        assert_eq!(options.env, vec![("TERM".to_string(), "dumb".to_string())]);
    }

    #[test]
    fn test_spawn_options_defaults() {
        let options = SpawnOptions::new("bash");
        assert_eq!((options.cols, options.rows), (DEFAULT_COLS, DEFAULT_ROWS));
        assert!(options.args.is_empty());
        assert!(options.dir.is_none());
    }
}
