// SPDX-License-Identifier: GPL-3.0-only

//! Subprocess execution with concurrently serviced pipes
//!
//! Pipe buffers are bounded, so stdin is written and stdout/stderr are
//! drained on three scoped threads while the caller waits for the child.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use tracing::debug;

use crate::error::{AttachError, Result};

/// How a subprocess terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    pub fn success(self) -> bool {
        self == Self::Exited(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(-1),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Stdout of a successful run, or `SubprocessFailed` carrying stderr.
    pub fn into_stdout(self, program: &Path) -> Result<Vec<u8>> {
        if self.status.success() {
            return Ok(self.stdout);
        }

        Err(AttachError::SubprocessFailed {
            program: program.display().to_string(),
            outcome: self.status.to_string(),
            stderr: String::from_utf8_lossy(&self.stderr).trim_end().to_string(),
        })
    }
}

/// Runs a program to completion, feeding `stdin` and capturing output.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String], stdin: &[u8]) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes and OS pipes
#[derive(Debug, Default, Clone, Copy)]
pub struct PipedRunner;

impl CommandRunner for PipedRunner {
    fn run(&self, program: &Path, args: &[String], stdin: &[u8]) -> Result<CommandOutput> {
        debug!("Spawning {} {:?}", program.display(), args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AttachError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let (Some(mut stdin_pipe), Some(mut stdout_pipe), Some(mut stderr_pipe)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AttachError::Io(io::Error::other("child pipes were not captured")));
        };

        let (status, written, stdout, stderr) = thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let result = stdin_pipe.write_all(stdin);
                // Dropping the pipe closes the child's stdin
                drop(stdin_pipe);
                result
            });
            let stdout_reader = scope.spawn(move || {
                let mut buffer = Vec::new();
                stdout_pipe.read_to_end(&mut buffer).map(|_| buffer)
            });
            let stderr_reader = scope.spawn(move || {
                let mut buffer = Vec::new();
                stderr_pipe.read_to_end(&mut buffer).map(|_| buffer)
            });

            let status = child.wait();

            (
                status,
                join_worker(writer),
                join_worker(stdout_reader),
                join_worker(stderr_reader),
            )
        });

        let status = ExitOutcome::from(status?);

        match written {
            Ok(()) => {}
            // The child may exit without consuming all of its input
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("{} closed stdin early", program.display());
            }
            Err(err) => return Err(err.into()),
        }

        let output = CommandOutput {
            status,
            stdout: stdout?,
            stderr: stderr?,
        };

        debug!("{} {}", program.display(), output.status);
        Ok(output)
    }
}

fn join_worker<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe worker panicked")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn cat_echoes_stdin() {
        let output = PipedRunner
            .run(Path::new("/bin/cat"), &[], b"secret\nY\n")
            .unwrap();

        assert_eq!(output.status, ExitOutcome::Exited(0));
        assert_eq!(output.stdout, b"secret\nY\n");
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn large_payloads_do_not_deadlock() {
        // Well beyond any pipe buffer in both directions
        let payload = vec![b'x'; 4 * 1024 * 1024];
        let output = PipedRunner
            .run(Path::new("/bin/cat"), &[], &payload)
            .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout.len(), payload.len());
    }

    #[test]
    fn stdout_and_stderr_are_captured_separately() {
        let output = PipedRunner
            .run(
                Path::new("/bin/sh"),
                &sh("echo out; echo err >&2; exit 3"),
                b"",
            )
            .unwrap();

        assert_eq!(output.status, ExitOutcome::Exited(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[test]
    fn signal_termination_is_reported() {
        let output = PipedRunner
            .run(Path::new("/bin/sh"), &sh("kill -9 $$"), b"")
            .unwrap();

        assert_eq!(output.status, ExitOutcome::Signaled(9));
        assert!(!output.status.success());
    }

    #[test]
    fn unread_stdin_is_not_an_error() {
        let payload = vec![b'y'; 1024 * 1024];
        let output = PipedRunner
            .run(Path::new("/bin/sh"), &sh("exit 0"), &payload)
            .unwrap();

        assert!(output.status.success());
    }

    #[test]
    fn failed_run_carries_stderr() {
        let program = Path::new("/bin/sh");
        let err = PipedRunner
            .run(program, &sh("echo 'image not recognized' >&2; exit 1"), b"")
            .unwrap()
            .into_stdout(program)
            .unwrap_err();

        match err {
            AttachError::SubprocessFailed { outcome, stderr, .. } => {
                assert_eq!(outcome, "exited with status 1");
                assert_eq!(stderr, "image not recognized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = PipedRunner
            .run(Path::new("/nonexistent/hdiutil"), &[], b"")
            .unwrap_err();

        assert!(matches!(err, AttachError::Spawn { .. }));
    }
}
