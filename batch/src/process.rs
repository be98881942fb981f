//! External process execution with streamed, merged output.
//!
//! [`SystemProcessRunner`] launches the extraction tool with stdin closed
//! and stdout and stderr attached to one shared pipe, so the tool's output
//! arrives as a single stream in the order it was written. A reader thread
//! splits it into lines that are handed to the caller while the process is
//! still running. The runner blocks until the child exits, killing it first
//! when the batch is cancelled or the optional time budget runs out.
//!
//! Helpers the tool spawns can inherit the pipe and outlive it. Once the
//! tool itself has exited, output is drained until it goes quiet for a
//! short grace period; the reader is then left to finish on its own.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use extract_queue_core::{FailureCode, Invocation};

use crate::CancelToken;

/// How often cancellation and the time budget are re-checked while a
/// child is alive (milliseconds).
const POLL_INTERVAL_MS: u64 = 50;

/// How long output may stay silent after the tool exits before the reader
/// is abandoned.
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

/// Why a child was killed before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    TimedOut,
    Cancelled,
}

/// Result of a process that was launched and has terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    pub interruption: Option<Interruption>,
}

impl ProcessExit {
    pub fn exited_cleanly(&self) -> bool {
        self.interruption.is_none() && self.exit_code == Some(0)
    }
}

/// Failures that prevent a process from running to completion.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to launch '{}': {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The process started but waiting on it failed.
    #[error("failed waiting for '{}': {source}", program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// Maps the error onto the failure code reported for the item.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            Self::Launch { source, .. } if source.kind() == ErrorKind::NotFound => {
                FailureCode::NotInstalled
            }
            Self::Launch { source, .. } if source.kind() == ErrorKind::PermissionDenied => {
                FailureCode::PermissionBlocked
            }
            Self::Launch { .. } | Self::Wait { .. } => FailureCode::LaunchFailed,
        }
    }
}

/// Runs one invocation to completion.
///
/// Implementations must deliver output through `on_output` as it arrives,
/// must not return before the process has terminated, and must report a
/// launch failure as an error rather than as an exit code.
pub trait ProcessRunner {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<ProcessExit, ProcessError>;
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
    poll_interval: Duration,
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills any child that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn check_interruption(&self, cancel: &CancelToken, started: Instant) -> Option<Interruption> {
        if cancel.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Some(Interruption::TimedOut),
            _ => None,
        }
    }

    fn interrupt_if_needed(
        &self,
        child: &mut Child,
        invocation: &Invocation,
        cancel: &CancelToken,
        started: Instant,
        interruption: &mut Option<Interruption>,
    ) {
        if interruption.is_some() {
            return;
        }
        if let Some(reason) = self.check_interruption(cancel, started) {
            debug!(invocation = %invocation, reason = ?reason, "Killing extraction tool");
            if let Err(e) = child.kill() {
                debug!(invocation = %invocation, error = %e, "Failed to kill extraction tool");
            }
            *interruption = Some(reason);
        }
    }

    fn wait_for_exit(
        &self,
        child: &mut Child,
        invocation: &Invocation,
        cancel: &CancelToken,
        started: Instant,
        interruption: &mut Option<Interruption>,
    ) -> Result<ExitStatus, ProcessError> {
        loop {
            match child.wait_timeout(self.poll_interval) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => self.interrupt_if_needed(child, invocation, cancel, started, interruption),
                Err(source) => return Err(self.abandon(child, invocation, source)),
            }
        }
    }

    fn abandon(&self, child: &mut Child, invocation: &Invocation, source: io::Error) -> ProcessError {
        let _ = child.kill();
        let _ = child.wait();
        ProcessError::Wait {
            program: invocation.program().to_path_buf(),
            source,
        }
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelToken,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<ProcessExit, ProcessError> {
        let launch_error = |source: io::Error| ProcessError::Launch {
            program: invocation.program().to_path_buf(),
            source,
        };

        // Both streams share one pipe so the reader sees them interleaved
        // exactly as the tool wrote them.
        let (pipe_reader, pipe_writer) = os_pipe::pipe().map_err(launch_error)?;
        let stderr_writer = pipe_writer.try_clone().map_err(launch_error)?;

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(pipe_writer)
            .stderr(stderr_writer);
        hide_console_window(&mut command);

        debug!(invocation = %invocation, "Spawning extraction tool");
        let spawned = command.spawn();
        // The command owns our copies of the write end; the reader only sees
        // EOF once they are gone.
        drop(command);
        let mut child = spawned.map_err(launch_error)?;
        let started = Instant::now();

        let (tx, rx) = mpsc::channel();
        let reader = spawn_line_reader(pipe_reader, tx);

        let mut output = String::new();
        let mut interruption = None;
        let mut exit_status: Option<ExitStatus> = None;
        let mut wait_error = None;
        let mut last_activity = Instant::now();

        let hung_up = forward_output(&rx, self.poll_interval, &mut output, on_output, |received| {
            if received {
                last_activity = Instant::now();
            }
            if exit_status.is_some() {
                // Processes the tool left behind may still hold the pipe.
                return if last_activity.elapsed() >= OUTPUT_GRACE {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                };
            }
            self.interrupt_if_needed(&mut child, invocation, cancel, started, &mut interruption);
            match child.try_wait() {
                Ok(Some(status)) => {
                    exit_status = Some(status);
                    last_activity = Instant::now();
                    ControlFlow::Continue(())
                }
                Ok(None) => ControlFlow::Continue(()),
                Err(e) => {
                    wait_error = Some(e);
                    ControlFlow::Break(())
                }
            }
        });

        let status = match (wait_error, exit_status) {
            (Some(source), _) => return Err(self.abandon(&mut child, invocation, source)),
            (None, Some(status)) => status,
            (None, None) => {
                self.wait_for_exit(&mut child, invocation, cancel, started, &mut interruption)?
            }
        };

        if hung_up {
            if let Ok(Err(e)) = reader.join() {
                debug!(invocation = %invocation, error = %e, "Failed to read tool output");
            }
        } else {
            debug!(
                invocation = %invocation,
                "Tool output still open after exit; leaving reader detached"
            );
        }

        debug!(
            invocation = %invocation,
            exit_code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction tool exited"
        );

        Ok(ProcessExit {
            exit_code: status.code(),
            output,
            interruption,
        })
    }
}

/// Forwards chunks until the reader hangs up or `tick` breaks.
///
/// `tick` runs after every message and idle poll and is told whether that
/// poll delivered output. Returns `true` when the reader hung up.
fn forward_output(
    rx: &Receiver<String>,
    poll_interval: Duration,
    output: &mut String,
    on_output: &mut dyn FnMut(&str),
    mut tick: impl FnMut(bool) -> ControlFlow<()>,
) -> bool {
    loop {
        let received = match rx.recv_timeout(poll_interval) {
            Ok(chunk) => {
                on_output(&chunk);
                output.push_str(&chunk);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => return true,
        };
        if tick(received).is_break() {
            return false;
        }
    }
}

fn spawn_line_reader<R>(pipe: R, tx: Sender<String>) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).is_err() {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    })
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}
