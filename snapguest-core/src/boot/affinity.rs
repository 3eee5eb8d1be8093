// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Thread CPU affinity, used to enumerate vCPUs.

use nix::errno::Errno;
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::types::CpuId;

/// Pins the calling thread to a single CPU.
pub trait CpuAffinity {
    fn pin(&mut self, cpu: CpuId) -> Result<(), Errno>;
}

/// Why CPU probing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStop {
    /// The kernel rejected the CPU index; it does not exist.
    CpuAbsent,
    /// Some other affinity failure.
    ///
    /// Probing still stops here: the host snapshots however many CPUs
    /// reported, so an unexpected failure shrinks the count rather than
    /// aborting the boot.
    Unexpected(Errno),
}

/// Classify a failed pin attempt during CPU probing.
///
/// `EINVAL` is what `sched_setaffinity` reports for a mask with no online
/// CPU, and what `CpuSet::set` reports past the end of the set. Every
/// other errno is kept distinct so it can be logged, but ends the probe
/// just the same.
pub fn classify_affinity_error(err: Errno) -> ProbeStop {
    match err {
        Errno::EINVAL => ProbeStop::CpuAbsent,
        other => ProbeStop::Unexpected(other),
    }
}

/// `sched_setaffinity` on the calling thread.
///
/// Owns the CPU-set buffer for the lifetime of the boot handshake.
#[derive(Debug)]
pub struct SchedAffinity {
    cpuset: CpuSet,
}

impl SchedAffinity {
    pub fn new() -> Self {
        Self {
            cpuset: CpuSet::new(),
        }
    }

    /// Largest CPU index the set can describe, plus one.
    pub fn capacity() -> usize {
        CpuSet::count()
    }
}

impl Default for SchedAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuAffinity for SchedAffinity {
    fn pin(&mut self, cpu: CpuId) -> Result<(), Errno> {
        self.cpuset = CpuSet::new();
        self.cpuset.set(cpu.index())?;
        // Pid 0 targets the calling thread.
        sched_setaffinity(Pid::from_raw(0), &self.cpuset)?;

        tracing::debug!(cpu = %cpu, "Pinned to CPU");
        Ok(())
    }
}
