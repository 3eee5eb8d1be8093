// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-request worker processes.
//!
//! Each request runs in a fresh process that is never reused. The worker
//! receives the raw request line as its only argument and answers with one
//! line on stdout. The dispatcher holds only the read end of that pipe.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::frame::MAX_FRAME_PAYLOAD;
use crate::types::{Request, Response, WorkerPath};

/// Most bytes read from a worker per request. One past the frame limit,
/// so an oversized line is still recognised as oversized.
pub const MAX_RESPONSE_READ: usize = MAX_FRAME_PAYLOAD + 1;

/// What a worker produced on stdout.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// One line, newline included when the worker wrote one.
    Output(Response),
    /// The worker closed stdout without writing anything.
    NoOutput,
    /// Nothing arrived within the response timeout; the worker was killed.
    TimedOut(WorkerError),
    /// Reading the pipe failed.
    Failed(WorkerError),
}

/// Spawns workers from a fixed executable.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    path: WorkerPath,
    response_timeout: Duration,
    exit_timeout: Duration,
}

impl WorkerLauncher {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            path: config.path.clone(),
            response_timeout: config.response_timeout,
            exit_timeout: config.exit_timeout,
        }
    }

    pub fn path(&self) -> &WorkerPath {
        &self.path
    }

    /// Spawn a worker for `request` with stdout captured.
    ///
    /// # Errors
    /// Returns `WorkerError::SpawnFailed` if the executable is missing, not
    /// executable, or the request contains a NUL byte.
    pub fn spawn(&self, request: &Request) -> Result<Worker, WorkerError> {
        let child = Command::new(self.path.as_path())
            .arg(OsStr::from_bytes(request.as_bytes()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::SpawnFailed {
                path: self.path.as_path().to_path_buf(),
                source,
            })?;

        Worker::from_child(child, self.response_timeout, self.exit_timeout)
    }
}

/// A running worker and the read end of its stdout pipe.
#[derive(Debug)]
pub struct Worker {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    pid: Option<u32>,
    response_timeout: Duration,
    exit_timeout: Duration,
}

impl Worker {
    fn from_child(
        mut child: Child,
        response_timeout: Duration,
        exit_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| WorkerError::ReadFailed {
                source: std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "worker stdout was not captured",
                ),
            })?;

        tracing::debug!(pid = ?pid, "Spawned worker");

        Ok(Self {
            child,
            stdout: Some(stdout),
            pid,
            response_timeout,
            exit_timeout,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Read one line from the worker, bounded by the response timeout.
    ///
    /// At most [`MAX_RESPONSE_READ`] bytes are read. A longer line is
    /// returned cut at that size and the rest stays in the pipe until the
    /// worker is reaped.
    pub async fn read_response(&mut self) -> WorkerOutcome {
        let Some(stdout) = self.stdout.as_mut() else {
            return WorkerOutcome::NoOutput;
        };

        let mut line = Vec::with_capacity(MAX_RESPONSE_READ);
        let mut bounded = stdout.take(MAX_RESPONSE_READ as u64);
        let read =
            tokio::time::timeout(self.response_timeout, bounded.read_until(b'\n', &mut line))
                .await;

        match read {
            Ok(Ok(0)) => WorkerOutcome::NoOutput,
            Ok(Ok(n)) => {
                if line.last() != Some(&b'\n') && n == MAX_RESPONSE_READ {
                    tracing::debug!(pid = ?self.pid, limit = n, "Worker output cut at read limit");
                }
                WorkerOutcome::Output(Response::new(line))
            }
            Ok(Err(source)) => WorkerOutcome::Failed(WorkerError::ReadFailed { source }),
            Err(_) => {
                tracing::warn!(
                    pid = ?self.pid,
                    timeout_ms = self.response_timeout.as_millis() as u64,
                    "Worker response timed out, killing"
                );
                if let Err(e) = self.child.start_kill() {
                    tracing::warn!(pid = ?self.pid, error = %e, "Failed to kill worker");
                }
                WorkerOutcome::TimedOut(WorkerError::ResponseTimeout {
                    timeout_ms: self.response_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Close the pipe and wait for the worker to exit.
    ///
    /// A worker still running after the exit timeout is killed and reaped,
    /// and `WorkerError::ExitTimeout` is returned. Either way no zombie is
    /// left behind.
    pub async fn reap(mut self) -> Result<ExitStatus, WorkerError> {
        drop(self.stdout.take());

        let waited = tokio::time::timeout(self.exit_timeout, self.child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => return Err(WorkerError::ReadFailed { source }),
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "Worker did not exit, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|source| WorkerError::ReadFailed { source })?;
                return Err(WorkerError::ExitTimeout {
                    timeout_ms: self.exit_timeout.as_millis() as u64,
                });
            }
        };

        if status.success() {
            tracing::debug!(pid = ?self.pid, "Worker exited");
        } else {
            tracing::warn!(pid = ?self.pid, status = %status, "Worker exited abnormally");
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use crate::frame::OversizePolicy;

    fn write_script(dir: &Path, name: &str, body: &str) -> WorkerPath {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        WorkerPath::new(path).unwrap()
    }

    fn launcher(path: WorkerPath, response_ms: u64, exit_ms: u64) -> WorkerLauncher {
        WorkerLauncher::new(&WorkerConfig {
            path,
            response_timeout: Duration::from_millis(response_ms),
            exit_timeout: Duration::from_millis(exit_ms),
            oversize: OversizePolicy::Reject,
        })
    }

    #[tokio::test]
    async fn test_worker_receives_request_as_argument() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "echo", r#"printf '%s' "$1""#);
        let launcher = launcher(path, 5000, 5000);

        let mut worker = launcher.spawn(&Request::new(b"hello world\n".to_vec())).unwrap();
        assert!(worker.pid().is_some());

        match worker.read_response().await {
            WorkerOutcome::Output(response) => assert_eq!(response.as_bytes(), b"hello world\n"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(worker.reap().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_only_first_line_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "two", "echo one; echo two");
        let mut worker = launcher(path, 5000, 5000)
            .spawn(&Request::new(b"x\n".to_vec()))
            .unwrap();

        match worker.read_response().await {
            WorkerOutcome::Output(response) => assert_eq!(response.as_bytes(), b"one\n"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        worker.reap().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_stops_at_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(
            dir.path(),
            "flood",
            "head -c 10000000 /dev/zero | tr '\\0' 'f'",
        );
        let mut worker = launcher(path, 5000, 1000)
            .spawn(&Request::new(b"x\n".to_vec()))
            .unwrap();

        match worker.read_response().await {
            WorkerOutcome::Output(response) => {
                assert_eq!(response.len(), MAX_RESPONSE_READ);
                assert!(response.as_bytes().iter().all(|b| *b == b'f'));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Closing the pipe early ends the writer.
        let _ = worker.reap().await;
    }

    #[tokio::test]
    async fn test_no_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "silent", "exit 3");
        let mut worker = launcher(path, 5000, 5000)
            .spawn(&Request::new(b"x\n".to_vec()))
            .unwrap();

        assert!(matches!(worker.read_response().await, WorkerOutcome::NoOutput));
        let status = worker.reap().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_response_timeout_kills_worker() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "slow", "exec sleep 30");
        let mut worker = launcher(path, 100, 5000)
            .spawn(&Request::new(b"x\n".to_vec()))
            .unwrap();

        assert!(matches!(
            worker.read_response().await,
            WorkerOutcome::TimedOut(WorkerError::ResponseTimeout { timeout_ms: 100 })
        ));
        let status = worker.reap().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_exit_timeout_kills_worker() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "linger", "echo done; exec sleep 30");
        let mut worker = launcher(path, 5000, 100)
            .spawn(&Request::new(b"x\n".to_vec()))
            .unwrap();

        assert!(matches!(
            worker.read_response().await,
            WorkerOutcome::Output(_)
        ));
        assert!(matches!(
            worker.reap().await,
            Err(WorkerError::ExitTimeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let launcher = launcher(
            WorkerPath::new_unchecked("/nonexistent/workload"),
            1000,
            1000,
        );
        assert!(matches!(
            launcher.spawn(&Request::new(b"x\n".to_vec())),
            Err(WorkerError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_request_with_nul_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_script(dir.path(), "echo", r#"printf '%s' "$1""#);
        let result = launcher(path, 1000, 1000).spawn(&Request::new(b"a\0b\n".to_vec()));
        assert!(matches!(result, Err(WorkerError::SpawnFailed { .. })));
    }
}
