// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! snapguest Core Library
//!
//! Guest-side control process for snapshot microVMs. Provides the
//! hypervisor boot handshake, the function filesystem mount, the serial
//! transport, and the one-request-at-a-time worker dispatch loop.

pub mod boot;
pub mod config;
pub mod dispatch;
pub mod entropy;
pub mod error;
pub mod frame;
pub mod mount;
pub mod state;
pub mod stats;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use boot::{BootReport, BootSignaler, SignalValues};
pub use config::{Config, ConfigLoader};
pub use dispatch::Dispatcher;
pub use error::{GuestError, GuestResult};
pub use frame::{Frame, OversizePolicy};
pub use state::{DispatchState, DispatchStateMachine};
pub use stats::DispatchStats;
pub use transport::Transport;
pub use types::{BootSignal, CpuId, Request, Response, WorkerPath};
pub use worker::{WorkerLauncher, WorkerOutcome};
