// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The request dispatch loop.
//!
//! One request is served at a time: read a line, spawn a worker, frame its
//! first output line, write it, then reap the worker before reading again.
//! Worker failures become the empty frame; only transport failures end the
//! loop.

use std::convert::Infallible;

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::config::WorkerConfig;
use crate::error::{GuestError, GuestResult};
use crate::frame::{Frame, OversizePolicy, MAX_FRAME_PAYLOAD};
use crate::state::{DispatchState, DispatchStateMachine};
use crate::stats::DispatchStats;
use crate::transport::read_request;
use crate::worker::{WorkerLauncher, WorkerOutcome};

/// Sequential request dispatcher over an inbound and outbound stream.
pub struct Dispatcher<R, W> {
    inbound: R,
    outbound: W,
    launcher: WorkerLauncher,
    oversize: OversizePolicy,
    state: DispatchStateMachine,
    stats: DispatchStats,
}

impl<R, W> Dispatcher<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(inbound: R, outbound: W, config: &WorkerConfig) -> Self {
        Self {
            inbound,
            outbound,
            launcher: WorkerLauncher::new(config),
            oversize: config.oversize,
            state: DispatchStateMachine::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Serve requests until the transport fails.
    pub async fn run(&mut self) -> GuestResult<Infallible> {
        tracing::info!(worker = %self.launcher.path(), "Dispatch loop started");
        loop {
            self.serve_one().await?;
        }
    }

    /// Serve exactly `cycles` requests.
    pub async fn run_for(&mut self, cycles: u64) -> GuestResult<()> {
        for _ in 0..cycles {
            self.serve_one().await?;
        }
        Ok(())
    }

    /// Run one full request cycle.
    ///
    /// # Errors
    /// Only transport and state-machine failures are returned; every worker
    /// failure is answered with the empty frame.
    pub async fn serve_one(&mut self) -> GuestResult<()> {
        let request = read_request(&mut self.inbound).await?;
        tracing::debug!(len = request.len(), "Request received");

        self.state.transition_to(DispatchState::Dispatching)?;

        let (frame, worker) = match self.launcher.spawn(&request) {
            Ok(mut worker) => {
                self.state.transition_to(DispatchState::AwaitingResponse)?;
                let outcome = worker.read_response().await;
                self.state.transition_to(DispatchState::Responding)?;
                (self.frame_for(outcome), Some(worker))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Worker spawn failed");
                self.stats.spawn_failures += 1;
                self.state.transition_to(DispatchState::Responding)?;
                (Frame::empty(), None)
            }
        };

        frame
            .write_to(&mut self.outbound)
            .await
            .map_err(|e| GuestError::Io {
                context: "writing response",
                source: e,
            })?;

        if let Some(worker) = worker {
            if let Err(e) = worker.reap().await {
                tracing::warn!(error = %e, "Worker reap failed");
                self.stats.exit_timeouts += 1;
            }
        }

        self.state.transition_to(DispatchState::AwaitingRequest)?;
        self.stats.cycles += 1;
        if !frame.is_empty() {
            self.stats.responses += 1;
        }

        tracing::debug!(
            cycle = self.stats.cycles,
            frame_len = frame.len_byte(),
            stats = ?self.stats,
            "Response sent"
        );
        Ok(())
    }

    fn frame_for(&mut self, outcome: WorkerOutcome) -> Frame {
        match outcome {
            WorkerOutcome::Output(response) => {
                if response.len() > MAX_FRAME_PAYLOAD {
                    self.stats.oversize += 1;
                }
                match Frame::encode(response, self.oversize) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "Rejecting oversized response");
                        Frame::empty()
                    }
                }
            }
            WorkerOutcome::NoOutput => {
                tracing::warn!("Worker produced no output");
                self.stats.empty_outputs += 1;
                Frame::empty()
            }
            WorkerOutcome::TimedOut(e) => {
                tracing::warn!(error = %e, "Worker timed out");
                self.stats.response_timeouts += 1;
                Frame::empty()
            }
            WorkerOutcome::Failed(e) => {
                tracing::warn!(error = %e, "Worker output unreadable");
                self.stats.read_failures += 1;
                Frame::empty()
            }
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn state(&self) -> DispatchState {
        self.state.state()
    }

    /// Recover the streams, e.g. to inspect what was written.
    pub fn into_parts(self) -> (R, W) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use crate::types::WorkerPath;

    fn worker_config(dir: &Path, body: &str, oversize: OversizePolicy) -> WorkerConfig {
        let path = dir.join("workload");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        WorkerConfig {
            path: WorkerPath::new(path).unwrap(),
            response_timeout: Duration::from_secs(5),
            exit_timeout: Duration::from_secs(5),
            oversize,
        }
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = worker_config(dir.path(), r#"printf '%s' "$1""#, OversizePolicy::Reject);

        let input: &[u8] = b"ping\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        dispatcher.serve_one().await.unwrap();

        assert_eq!(dispatcher.state(), DispatchState::AwaitingRequest);
        assert_eq!(dispatcher.stats().responses, 1);
        let (_, out) = dispatcher.into_parts();
        assert_eq!(out, b"\x05ping\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_sends_empty_frame() {
        let config = WorkerConfig {
            path: WorkerPath::new_unchecked("/nonexistent/workload"),
            response_timeout: Duration::from_secs(1),
            exit_timeout: Duration::from_secs(1),
            oversize: OversizePolicy::Reject,
        };

        let input: &[u8] = b"a\nb\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        dispatcher.run_for(2).await.unwrap();

        assert_eq!(dispatcher.stats().spawn_failures, 2);
        assert_eq!(dispatcher.stats().error_responses(), 2);
        let (_, out) = dispatcher.into_parts();
        assert_eq!(out, vec![0, 0]);
    }

    #[tokio::test]
    async fn test_transport_close_ends_loop() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = worker_config(dir.path(), r#"printf '%s' "$1""#, OversizePolicy::Reject);

        let input: &[u8] = b"only\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        let result = dispatcher.run().await;

        assert!(matches!(result, Err(GuestError::TransportClosed)));
        assert_eq!(dispatcher.stats().cycles, 1);
    }

    #[tokio::test]
    async fn test_oversize_counts() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = worker_config(
            dir.path(),
            "head -c 300 /dev/zero | tr '\\0' 'x'; echo",
            OversizePolicy::Reject,
        );

        let input: &[u8] = b"big\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        dispatcher.serve_one().await.unwrap();

        assert_eq!(dispatcher.stats().oversize, 1);
        let (_, out) = dispatcher.into_parts();
        assert_eq!(out, vec![0]);
    }

    #[tokio::test]
    async fn test_truncated_response_counts_as_oversize() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = worker_config(
            dir.path(),
            "head -c 300 /dev/zero | tr '\\0' 'x'; echo",
            OversizePolicy::Truncate,
        );

        let input: &[u8] = b"big\nsmall\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        dispatcher.run_for(2).await.unwrap();

        assert_eq!(dispatcher.stats().oversize, 2);
        assert_eq!(dispatcher.stats().responses, 2);
        assert_eq!(dispatcher.stats().error_responses(), 0);
        let (_, out) = dispatcher.into_parts();
        assert_eq!(out.len(), 2 * 256);
        assert_eq!(out[0], 255);
        assert_eq!(out[256], 255);
    }

    #[tokio::test]
    async fn test_fitting_response_is_not_oversize() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = worker_config(
            dir.path(),
            "head -c 254 /dev/zero | tr '\\0' 'x'; echo",
            OversizePolicy::Truncate,
        );

        let input: &[u8] = b"fits\n";
        let mut dispatcher = Dispatcher::new(input, Vec::new(), &config);
        dispatcher.serve_one().await.unwrap();

        assert_eq!(dispatcher.stats().oversize, 0);
        let (_, out) = dispatcher.into_parts();
        assert_eq!(out[0], 255);
        assert_eq!(out[255], b'\n');
    }
}
