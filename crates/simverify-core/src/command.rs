//! Subprocess execution with a bounded wait.
//!
//! Every external tool the harness talks to (`xcrun simctl` in practice) is
//! invoked through the [`CommandRunner`] trait. [`SystemRunner`] spawns real
//! processes; tests substitute a scripted runner.
//!
//! A run never fails with an error value. Spawn failures, non-zero exits and
//! timeouts all come back as a [`CommandResult`] with `success == false`, so
//! callers can turn them into failed checks without any error plumbing.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use simverify_core::command::run_command;
//!
//! let result = run_command("xcrun", &["simctl", "list", "devices"], Duration::from_secs(30));
//! if result.success {
//!     println!("{}", result.stdout);
//! } else {
//!     eprintln!("{}", result.stderr);
//! }
//! ```

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Error text reported when a command exceeds its timeout.
pub const TIMEOUT_MESSAGE: &str = "Command timed out";

/// Timeout applied when the caller has no better value.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a running child is polled for exit.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Outcome of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// `true` only if the process ran to completion with a zero exit status.
    pub success: bool,
    /// Captured standard output, lossily decoded as UTF-8.
    pub stdout: String,
    /// Captured standard error, or the failure description when the process
    /// could not be run or timed out.
    pub stderr: String,
}

impl CommandResult {
    /// A successful result with the given standard output.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result carrying only an error description.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// A failed result describing a timeout.
    pub fn timed_out() -> Self {
        Self::failure(TIMEOUT_MESSAGE)
    }

    /// Whether this result came from a command that hit its deadline.
    pub fn is_timeout(&self) -> bool {
        !self.success && self.stderr == TIMEOUT_MESSAGE
    }
}

/// Runs external programs on behalf of the harness.
pub trait CommandRunner {
    /// Run `program` with `args`, waiting at most `timeout` for it to exit.
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandResult;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandResult {
        (**self).run(program, args, timeout)
    }
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandResult {
        run_command(program, args, timeout)
    }
}

/// Spawn `program` with `args`, capture its output, and wait up to `timeout`.
///
/// The program is executed directly, without a shell. On timeout the child is
/// killed and the result's `stderr` is [`TIMEOUT_MESSAGE`]. If the program
/// cannot be started, `stderr` holds the I/O error text. A single attempt is
/// made; there are no retries.
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> CommandResult {
    debug!(program, ?args, timeout_ms = timeout.as_millis() as u64, "Spawning command");

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program, error = %e, "Failed to spawn command");
            return CommandResult::failure(e.to_string());
        }
    };

    // Drain both pipes off-thread so a chatty child cannot block on a full pipe.
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    // A timeout too large to represent as an instant means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                let now = Instant::now();
                let pause = match deadline {
                    Some(deadline) if now >= deadline => {
                        let _ = child.kill();
                        let _ = child.wait();
                        warn!(program, ?args, "Command timed out");
                        // Reader threads are left to finish on their own; a
                        // grandchild may still hold the pipes open.
                        return CommandResult::timed_out();
                    }
                    Some(deadline) => WAIT_POLL.min(deadline - now),
                    None => WAIT_POLL,
                };
                thread::sleep(pause);
            }
            Err(e) => {
                let _ = child.kill();
                warn!(program, error = %e, "Failed to wait for command");
                return CommandResult::failure(e.to_string());
            }
        }
    };

    let result = CommandResult {
        success: status.success(),
        stdout: collect(stdout_reader),
        stderr: collect(stderr_reader),
    };
    debug!(program, success = result.success, code = ?status.code(), "Command finished");
    result
}

fn spawn_reader<T>(pipe: Option<T>) -> Option<JoinHandle<String>>
where
    T: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
