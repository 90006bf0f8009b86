//! Post-install smoke test.
//!
//! Runs the freshly installed executable with the descriptor's arguments and
//! checks that the expected text appears in its combined stdout and stderr.
//! The whole run is bounded by one deadline: the child is killed and reaped
//! if it overruns, and output that is still being written when the deadline
//! passes (for example by a background process that inherited the pipes)
//! also counts as a timeout.

use crate::formula::descriptor::SmokeTestSpec;
use camino::Utf8Path;
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Default bound on how long the smoke test may run.
pub const DEFAULT_SMOKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest output excerpt carried inside an error.
const OUTPUT_EXCERPT_CHARS: usize = 400;

/// How often spawning is retried while the kernel still reports the new
/// executable as busy.
const SPAWN_BUSY_RETRIES: u32 = 5;
const SPAWN_BUSY_DELAY: Duration = Duration::from_millis(50);

/// Why the installed binary failed its smoke test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmokeError {
    /// The binary could not be started at all.
    #[error("could not run the installed binary: {reason}")]
    Spawn {
        /// Description of the spawn failure.
        reason: String,
    },

    /// The binary, or something it left running, outlived the timeout.
    #[error("binary did not finish within {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The binary exited unsuccessfully.
    #[error("binary exited with {}: {output}", describe_code(.code.as_ref()))]
    ExitStatus {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Excerpt of the combined output.
        output: String,
    },

    /// The binary exited successfully but printed the wrong thing.
    #[error("expected output containing {expected:?}, got {output:?}")]
    MissingOutput {
        /// The substring that was expected.
        expected: String,
        /// Excerpt of the combined output.
        output: String,
    },
}

fn describe_code(code: Option<&i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_owned(),
    }
}

/// What a passing smoke test observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    /// Combined stdout and stderr of the run.
    pub output: String,
}

/// Run `binary` according to `spec`, bounded by `timeout`.
///
/// # Errors
///
/// Returns a [`SmokeError`] if `binary` is not an absolute path or cannot
/// be spawned, overruns the timeout, exits non-zero, or its output lacks
/// `spec.expect`.
pub fn run_smoke_test(
    binary: &Utf8Path,
    spec: &SmokeTestSpec,
    timeout: Duration,
) -> Result<SmokeReport, SmokeError> {
    debug!("smoke testing {binary} {}", spec.args.join(" "));
    if !binary.is_absolute() {
        return Err(SmokeError::Spawn {
            reason: format!("{binary} is not an absolute path"),
        });
    }
    let deadline = Instant::now() + timeout;
    let mut child = spawn(binary, &spec.args).map_err(|e| SmokeError::Spawn {
        reason: e.to_string(),
    })?;

    let (tx, rx) = mpsc::channel();
    let pipes = usize::from(drain(child.stdout.take(), Stream::Stdout, &tx))
        + usize::from(drain(child.stderr.take(), Stream::Stderr, &tx));
    drop(tx);

    let remaining = deadline.saturating_duration_since(Instant::now());
    let status = match child.wait_timeout(remaining) {
        Ok(Some(status)) => status,
        Ok(None) => {
            terminate(&mut child);
            return Err(SmokeError::Timeout { timeout });
        }
        Err(e) => {
            terminate(&mut child);
            return Err(SmokeError::Spawn {
                reason: e.to_string(),
            });
        }
    };

    let Some(output) = collect(&rx, pipes, deadline) else {
        debug!("{binary} exited but its output pipes stayed open past the deadline");
        return Err(SmokeError::Timeout { timeout });
    };

    if !status.success() {
        return Err(SmokeError::ExitStatus {
            code: status.code(),
            output: excerpt(&output),
        });
    }
    if !output.contains(&spec.expect) {
        return Err(SmokeError::MissingOutput {
            expected: spec.expect.clone(),
            output: excerpt(&output),
        });
    }
    Ok(SmokeReport { output })
}

/// Spawn the binary, retrying briefly while it is reported busy.
///
/// A file that was just written can still be open for writing in a forked
/// sibling process, which makes `execve` fail with `ETXTBSY`.
fn spawn(binary: &Utf8Path, args: &[String]) -> io::Result<Child> {
    let mut attempt = 0;
    loop {
        let result = Command::new(binary.as_std_path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            Err(e)
                if e.kind() == io::ErrorKind::ExecutableFileBusy
                    && attempt < SPAWN_BUSY_RETRIES =>
            {
                attempt += 1;
                debug!("{binary} is busy, retrying spawn ({attempt}/{SPAWN_BUSY_RETRIES})");
                thread::sleep(SPAWN_BUSY_DELAY);
            }
            other => return other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Read a pipe to the end on a helper thread so a chatty child cannot fill
/// the pipe buffer and stall. Returns whether a reader was started.
fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    stream: Stream,
    tx: &Sender<(Stream, Vec<u8>)>,
) -> bool {
    let Some(mut reader) = pipe else {
        return false;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            debug!("failed to read smoke test output: {e}");
        }
        if tx.send((stream, buf)).is_err() {
            // The smoke test already gave up on this output.
        }
    });
    true
}

/// Gather stdout followed by stderr, or `None` if a pipe is still open at
/// `deadline`.
fn collect(rx: &Receiver<(Stream, Vec<u8>)>, pipes: usize, deadline: Instant) -> Option<String> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..pipes {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining).ok()? {
            (Stream::Stdout, bytes) => stdout = bytes,
            (Stream::Stderr, bytes) => stderr = bytes,
        }
    }
    let mut output = String::from_utf8_lossy(&stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr));
    Some(output)
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("failed to kill smoke test process: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("failed to reap smoke test process: {e}");
    }
}

fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.chars().count() <= OUTPUT_EXCERPT_CHARS {
        return trimmed.to_owned();
    }
    let mut cut: String = trimmed.chars().take(OUTPUT_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
