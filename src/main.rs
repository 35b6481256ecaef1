use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, warn};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::PoisonError;
use std::time::Duration;
use ttywatch::config::{
    DEFAULT_COLS, DEFAULT_READY_MARKER, DEFAULT_ROWS, DEFAULT_SENTINEL, parse_duration,
    parse_env_pair,
};
use ttywatch::{
    PtySession, RunContext, SequenceDriver, SequenceError, Session, SpawnOptions, WaitError,
    classify, classify_exit, watch,
};

#[derive(Parser, Debug)]
#[command(
    name = "ttywatch",
    about = "Observe and synchronize with programs running in a PTY",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program and print its output as classified events
    Events(SpawnArgs),

    /// Wait for a prompt, answer it, and let the program finish
    Prompt {
        /// Text to wait for in the program output
        #[arg(short, long)]
        prompt: String,

        /// Line to send once the prompt appears
        #[arg(short, long)]
        reply: String,

        /// How long to wait for the prompt (`500ms`, `10s`)
        #[arg(short, long, value_parser = duration_arg, default_value = "10s")]
        timeout: Duration,

        #[command(flatten)]
        spawn: SpawnArgs,
    },

    /// Run a scripted command sequence in a shell and report how it ended
    Sequence {
        /// Shell to run the script in
        #[arg(long, default_value = default_shell())]
        shell: String,

        /// Script written to the shell as a single line
        #[arg(long)]
        script: Option<String>,

        /// Output line that marks the sequence as complete
        #[arg(long, default_value = DEFAULT_SENTINEL)]
        sentinel: String,

        /// Deadline for the whole run
        #[arg(short, long, value_parser = duration_arg, default_value = "15s")]
        timeout: Duration,

        /// Cancel the run after this long, as if Ctrl+C had been pressed
        #[arg(long, value_parser = duration_arg)]
        cancel_after: Option<Duration>,
    },
}

#[derive(Args, Debug)]
struct SpawnArgs {
    /// Terminal width
    #[arg(long, default_value_t = DEFAULT_COLS)]
    cols: u16,

    /// Terminal height
    #[arg(long, default_value_t = DEFAULT_ROWS)]
    rows: u16,

    /// Working directory for the program
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Extra environment variable, `KEY=VAL` (repeatable)
    #[arg(long = "env", value_parser = env_arg)]
    env: Vec<(String, String)>,

    /// Program to run
    #[arg(required = true)]
    program: String,

    /// Arguments to pass to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl SpawnArgs {
    fn options(&self) -> SpawnOptions {
        let mut options = SpawnOptions::new(&self.program)
            .args(self.args.iter().cloned())
            .size(self.cols, self.rows);
        options.dir = self.dir.clone();
        options.env = self.env.clone();
        options
    }
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|err| err.to_string())
}

fn env_arg(s: &str) -> Result<(String, String), String> {
    parse_env_pair(s).map_err(|err| err.to_string())
}

fn default_shell() -> &'static str {
    if cfg!(windows) { "cmd.exe" } else { "sh" }
}

fn default_script() -> String {
    if cfg!(windows) {
        format!(
            "@echo {DEFAULT_READY_MARKER} & @echo Loading... & ping -n 3 127.0.0.1 >NUL & @echo {DEFAULT_SENTINEL} & exit 0"
        )
    } else {
        format!("echo {DEFAULT_READY_MARKER}; echo Loading...; sleep 2; echo {DEFAULT_SENTINEL}; exit 0")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Events(spawn) => run_events(&spawn).await,
        Command::Prompt {
            prompt,
            reply,
            timeout,
            spawn,
        } => run_prompt(&spawn, &prompt, &reply, timeout).await,
        Command::Sequence {
            shell,
            script,
            sentinel,
            timeout,
            cancel_after,
        } => {
            let script = script.unwrap_or_else(default_script);
            let code = run_sequence(&shell, &script, &sentinel, timeout, cancel_after).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

async fn run_events(spawn: &SpawnArgs) -> Result<()> {
    println!("--- Capturing '{}' output as events ---", spawn.program);

    let mut session = PtySession::spawn(&spawn.options()).context("Error spawning process")?;
    let reader = session.take_reader().context("Failed to get PTY reader")?;

    let printer = tokio::task::spawn_blocking(move || -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for event in classify(reader) {
            writeln!(stdout, "{}", event?)?;
        }
        Ok(())
    });

    if let Err(err) = session.wait().await {
        if err.exit().is_none() {
            eprintln!("Wait error: {err}");
        }
    }

    // The reader ends once the PTY closes; don't hang on a grandchild holding it open.
    match tokio::time::timeout(Duration::from_secs(1), printer).await {
        Ok(Ok(Err(err))) => debug!("event stream ended: {err}"),
        Ok(Err(err)) => warn!("event printer failed: {err}"),
        Err(_) => debug!("event stream still open after exit"),
        Ok(Ok(Ok(()))) => {}
    }

    println!("\n--- Event stream terminated ---");
    Ok(())
}

async fn run_prompt(spawn: &SpawnArgs, prompt: &str, reply: &str, timeout: Duration) -> Result<()> {
    println!("--- Waiting for {prompt:?} from '{}' ---", spawn.program);

    let mut session = PtySession::spawn(&spawn.options()).context("Failed to spawn")?;
    let reader = session.take_reader().context("Failed to get PTY reader")?;

    let (mut watcher, signal) = watch(reader, prompt);
    tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout();
        if let Err(err) = io::copy(&mut watcher, &mut stdout) {
            debug!("output copy stopped: {err}");
        }
    });

    if let Err(err) = signal.wait_timeout(timeout).await {
        eprintln!("Timeout: Did not find expected prompt in PTY output.");
        debug!("{err}");
        if let Err(err) = session.kill() {
            debug!("kill failed: {err}");
        }
        std::process::exit(1);
    }

    println!("\n\nFound prompt. Sending {reply:?} to the program...");
    let writer = session.writer();
    let payload = format!("{reply}\r\n");
    tokio::task::spawn_blocking(move || {
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(payload.as_bytes()).and_then(|()| writer.flush())
    })
    .await?
    .context("Failed to write to PTY")?;

    if let Err(err) = session.wait().await {
        debug!("program ended with {err}");
    }
    println!("\nProgram finished.");
    Ok(())
}

async fn run_sequence(
    shell: &str,
    script: &str,
    sentinel: &str,
    timeout: Duration,
    cancel_after: Option<Duration>,
) -> Result<i32> {
    let root = RunContext::background();
    tokio::spawn({
        let root = root.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                root.cancel();
            }
        }
    });

    let ctx = root.with_timeout(timeout);
    if let Some(delay) = cancel_after {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            eprintln!("\nCancelling sequence...");
            ctx.cancel();
        });
    }

    println!("Spawning shell '{shell}' in a PTY...");
    let mut session = PtySession::spawn(&SpawnOptions::new(shell)).context("Failed to spawn")?;

    println!("Running command sequence...");
    let driver = SequenceDriver::new(script, sentinel);
    let completion = driver.completion();

    let wait_result: Result<(), WaitError> = match driver.run(&mut session, &ctx).await {
        Ok(()) => Ok(()),
        Err(SequenceError::Wait(err)) => Err(err),
        Err(SequenceError::Interrupted(cause)) => {
            debug!("killing shell after {cause}");
            if let Err(err) = session.kill() {
                debug!("kill failed: {err}");
            }
            session.wait().await
        }
        Err(err) => return Err(err.into()),
    };

    if !completion.is_done() {
        debug!("sentinel {sentinel:?} was not seen");
    }

    let (code, report) = classify_exit(ctx.err(), wait_result.as_ref().err());
    print!("{report}");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttywatch::config::{DEFAULT_PROMPT_TIMEOUT, DEFAULT_SEQUENCE_TIMEOUT};

    #[test]
    fn test_parse_events_args() {
        let cli = Cli::try_parse_from([
            "ttywatch", "events", "--cols", "100", "--env", "A=1", "--env", "B=2", "ls", "-la",
        ])
        .unwrap();
        let Command::Events(spawn) = cli.command else {
            panic!("expected events");
        };
        let options = spawn.options();
        assert_eq!(options.program, "ls");
        assert_eq!(options.args, vec!["-la"]);
        assert_eq!(options.cols, 100);
        assert_eq!(options.rows, DEFAULT_ROWS);
        assert_eq!(options.env.len(), 2);
    }

    #[test]
    fn test_events_requires_program() {
        assert!(Cli::try_parse_from(["ttywatch", "events"]).is_err());
    }

    #[test]
    fn test_bad_env_rejected() {
        assert!(Cli::try_parse_from(["ttywatch", "events", "--env", "NOPE", "ls"]).is_err());
    }

    #[test]
    fn test_prompt_defaults() {
        let cli = Cli::try_parse_from([
            "ttywatch", "prompt", "--prompt", "name? ", "--reply", "World", "./scan-target",
        ])
        .unwrap();
        let Command::Prompt { timeout, reply, .. } = cli.command else {
            panic!("expected prompt");
        };
        assert_eq!(timeout, DEFAULT_PROMPT_TIMEOUT);
        assert_eq!(reply, "World");
    }

    #[test]
    fn test_sequence_durations() {
        let cli = Cli::try_parse_from([
            "ttywatch", "sequence", "--timeout", "2s", "--cancel-after", "500ms",
        ])
        .unwrap();
        let Command::Sequence {
            timeout,
            cancel_after,
            sentinel,
            ..
        } = cli.command
        else {
            panic!("expected sequence");
        };
        assert_eq!(timeout, Duration::from_secs(2));
        assert_eq!(cancel_after, Some(Duration::from_millis(500)));
        assert_eq!(sentinel, DEFAULT_SENTINEL);
    }

    #[test]
    fn test_sequence_default_timeout() {
        let cli = Cli::try_parse_from(["ttywatch", "sequence"]).unwrap();
        let Command::Sequence { timeout, shell, .. } = cli.command else {
            panic!("expected sequence");
        };
        assert_eq!(timeout, DEFAULT_SEQUENCE_TIMEOUT);
        assert_eq!(shell, default_shell());
    }

    #[test]
    fn test_default_script_ends_with_sentinel_and_exit() {
        let script = default_script();
        assert!(script.contains(DEFAULT_READY_MARKER));
        assert!(script.contains(DEFAULT_SENTINEL));
        assert!(script.ends_with("exit 0"));
    }
}
