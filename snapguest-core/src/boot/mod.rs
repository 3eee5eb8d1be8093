// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapshot-readiness handshake with the hypervisor.
//!
//! The guest reports each quiescent CPU over a privileged I/O port, then
//! tells the host it may start sending requests.

mod affinity;
mod port;
mod signaler;

pub use affinity::{classify_affinity_error, CpuAffinity, ProbeStop, SchedAffinity};
pub use port::{DryRunPort, IoPort, PortIo};
pub use signaler::{BootReport, BootSignaler, SignalValues};
