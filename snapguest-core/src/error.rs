// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for snapguest.
//!
//! Errors are explicit enums. Startup errors propagate to process exit;
//! per-request errors are folded into an error response by the dispatcher
//! and never escape a single dispatch cycle.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the guest init.
#[derive(Debug, Error)]
pub enum GuestError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Boot Errors - Fatal, the VM cannot be snapshotted correctly
    // =========================================================================
    #[error("Boot error: {0}")]
    Boot(#[from] BootError),

    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Transport closed by host")]
    TransportClosed,

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("System call failed: {syscall} - {source}")]
    Syscall {
        syscall: &'static str,
        #[source]
        source: nix::Error,
    },
}

/// Hard validation errors stop the init before any boot signal is sent.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Signal values collide: {first} and {second} are both {value}")]
    SignalCollision {
        first: &'static str,
        second: &'static str,
        value: u32,
    },

    #[error("Worker path does not exist: {path}")]
    WorkerPathNotFound { path: PathBuf },

    #[error("Worker path is not executable: {path}")]
    WorkerNotExecutable { path: PathBuf },
}

/// Errors raised while cooperating with the hypervisor at boot.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Port I/O privilege denied: {source}")]
    PortPrivilege {
        #[source]
        source: nix::Error,
    },

    #[error("Port I/O is not supported on this architecture")]
    PortIoUnsupported,

    #[error("Failed to mount {source_dev} on {target}: {source}")]
    Mount {
        source_dev: PathBuf,
        target: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to open transport {path}: {source}")]
    TransportOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// State transition errors for the dispatch state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition dispatcher from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Per-request worker failures.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker {path}: {source}")]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker did not respond within {timeout_ms}ms")]
    ResponseTimeout { timeout_ms: u64 },

    #[error("Worker did not exit within {timeout_ms}ms")]
    ExitTimeout { timeout_ms: u64 },

    #[error("Failed to read worker output: {source}")]
    ReadFailed {
        #[source]
        source: std::io::Error,
    },
}

/// Response framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Response payload exceeds maximum: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Result type alias using GuestError.
pub type GuestResult<T> = Result<T, GuestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::InvalidFieldValue {
            field: "io_port",
            value: "0".to_string(),
            reason: "Port 0 is reserved".to_string(),
        };
        assert!(err.to_string().contains("io_port"));
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_error_chain() {
        let boot_err = BootError::PortPrivilege {
            source: nix::Error::EPERM,
        };
        let guest_err: GuestError = boot_err.into();
        assert!(matches!(guest_err, GuestError::Boot(_)));
    }

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::PayloadTooLarge { size: 300, max: 255 };
        assert_eq!(
            err.to_string(),
            "Response payload exceeds maximum: 300 > 255"
        );
    }
}
