// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-CPU readiness signalling.

use crate::config::BootConfig;
use crate::types::{BootSignal, CpuId, IoPortAddr};

use super::affinity::{classify_affinity_error, CpuAffinity, ProbeStop};
use super::port::PortIo;

/// Port and values used for each boot signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalValues {
    pub port: IoPortAddr,
    pub cpu_ready: u32,
    pub primary_ready: u32,
    pub requests_ready: u32,
}

impl SignalValues {
    pub fn value_of(&self, signal: BootSignal) -> u32 {
        match signal {
            BootSignal::CpuReady => self.cpu_ready,
            BootSignal::PrimaryReady => self.primary_ready,
            BootSignal::RequestsReady => self.requests_ready,
        }
    }
}

impl From<&BootConfig> for SignalValues {
    fn from(config: &BootConfig) -> Self {
        Self {
            port: config.io_port,
            cpu_ready: config.cpu_ready_signal,
            primary_ready: config.primary_ready_signal,
            requests_ready: config.requests_ready_signal,
        }
    }
}

/// Outcome of the CPU announcement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// CPUs discovered, including CPU 0.
    pub cpus: usize,
    /// `CpuReady` signals emitted (one per secondary CPU).
    pub cpu_ready_signals: usize,
    /// Why probing stopped.
    pub stop: ProbeStop,
}

/// Drives the snapshot-readiness handshake.
pub struct BootSignaler<P, A> {
    port: P,
    affinity: A,
    values: SignalValues,
}

impl<P: PortIo, A: CpuAffinity> BootSignaler<P, A> {
    pub fn new(port: P, affinity: A, values: SignalValues) -> Self {
        Self {
            port,
            affinity,
            values,
        }
    }

    /// Report every CPU as quiescent, then return to CPU 0.
    ///
    /// Secondary CPUs are probed upward from CPU 1 by pinning this thread to
    /// each in turn; the first failed pin ends the probe (see
    /// [`classify_affinity_error`]). Afterwards the thread is pinned back to
    /// CPU 0 and `PrimaryReady` is emitted.
    pub fn announce_cpus(&mut self) -> BootReport {
        let mut cpu = CpuId::new(1);
        let mut cpu_ready_signals = 0;

        let stop = loop {
            match self.affinity.pin(cpu) {
                Ok(()) => {
                    self.signal(BootSignal::CpuReady);
                    cpu_ready_signals += 1;
                    cpu = cpu.next();
                }
                Err(err) => {
                    let stop = classify_affinity_error(err);
                    match stop {
                        ProbeStop::CpuAbsent => {
                            tracing::debug!(cpu = %cpu, "CPU absent, probe complete");
                        }
                        ProbeStop::Unexpected(errno) => {
                            tracing::warn!(
                                cpu = %cpu,
                                error = %errno,
                                "Unexpected affinity failure, treating CPU as absent"
                            );
                        }
                    }
                    break stop;
                }
            }
        };

        if let Err(err) = self.affinity.pin(CpuId::PRIMARY) {
            tracing::error!(error = %err, "Failed to pin back to CPU 0");
        }
        self.signal(BootSignal::PrimaryReady);

        let report = BootReport {
            cpus: cpu_ready_signals + 1,
            cpu_ready_signals,
            stop,
        };

        tracing::info!(cpus = report.cpus, "All CPUs reported ready for snapshot");
        report
    }

    /// Tell the host the transport is open.
    pub fn requests_ready(&mut self) {
        self.signal(BootSignal::RequestsReady);
        tracing::info!("Signalled requests ready");
    }

    /// Emit one signal. Port writes are best-effort.
    pub fn signal(&mut self, signal: BootSignal) {
        let value = self.values.value_of(signal);
        if let Err(err) = self.port.write_u32(self.values.port, value) {
            tracing::warn!(
                signal = %signal,
                port = %self.values.port,
                error = %err,
                "Boot signal write failed"
            );
        } else {
            tracing::trace!(signal = %signal, value = value, "Boot signal emitted");
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn affinity(&self) -> &A {
        &self.affinity
    }
}
