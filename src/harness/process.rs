use super::InterruptFlag;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for output pipes after the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one subprocess run
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub interrupted: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.interrupted
    }

    /// stderr then stdout, for signature scanning
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stderr, self.stdout)
    }
}

/// Run `argv` in `cwd`, killing it on timeout or interruption
pub fn run_command(
    argv: &[String],
    cwd: &Path,
    envs: &[(String, String)],
    timeout: Duration,
    interrupt: &InterruptFlag,
) -> std::io::Result<CommandOutcome> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command template")
    })?;

    debug!("Running: {}", argv.join(" "));
    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let mut timed_out = false;
    let mut interrupted = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if interrupt.is_set() {
            interrupted = true;
        } else if start.elapsed() >= timeout {
            timed_out = true;
        }
        if timed_out || interrupted {
            warn!(
                "Killing '{}' ({})",
                program,
                if timed_out { "timed out" } else { "interrupted" }
            );
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_rx.recv_timeout(DRAIN_TIMEOUT).unwrap_or_default();
    let stderr = stderr_rx.recv_timeout(DRAIN_TIMEOUT).unwrap_or_default();

    Ok(CommandOutcome {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration: start.elapsed(),
        timed_out,
        interrupted,
    })
}

/// Read a pipe to the end on a helper thread.
/// Grandchildren may hold the pipe open after a kill, so the caller waits with a timeout.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}
