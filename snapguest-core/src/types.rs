// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for the values that cross the guest boundary.
//!
//! Requests and responses are opaque byte lines; nothing here inspects
//! their contents beyond the terminating newline.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::HardValidationError;

/// Logical CPU index as seen by the scheduler.
///
/// CPU 0 always exists and is the control CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(usize);

impl CpuId {
    /// The control CPU.
    pub const PRIMARY: CpuId = CpuId(0);

    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(&self) -> usize {
        self.0
    }

    /// The next CPU index to probe.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn is_primary(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Role of a value written to the hypervisor signal port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootSignal {
    /// A secondary CPU is quiescent.
    CpuReady,
    /// All secondaries reported; the control CPU is back on CPU 0.
    PrimaryReady,
    /// Transport is open; the host may start sending requests.
    RequestsReady,
}

impl BootSignal {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CpuReady => "CpuReady",
            Self::PrimaryReady => "PrimaryReady",
            Self::RequestsReady => "RequestsReady",
        }
    }
}

impl fmt::Display for BootSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fixed I/O port address used for boot signals.
/// Must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoPortAddr(u16);

impl IoPortAddr {
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "io_port",
                value: "0".to_string(),
                reason: "I/O port 0 is reserved".to_string(),
            });
        }
        Ok(Self(port))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for IoPortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// One request line read from the host, newline included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request(Vec<u8>);

impl Request {
    pub fn new(line: impl Into<Vec<u8>>) -> Self {
        Self(line.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One output line produced by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response(Vec<u8>);

impl Response {
    pub fn new(line: impl Into<Vec<u8>>) -> Self {
        Self(line.into())
    }

    /// The response sent when a worker fails.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Worker executable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPath(PathBuf);

impl WorkerPath {
    /// Create a new WorkerPath with existence and permission validation.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, HardValidationError> {
        let path = Self(path.into());
        path.check()?;
        Ok(path)
    }

    /// Create without validation.
    ///
    /// The worker normally lives on the function filesystem, which is not
    /// mounted yet when configuration is loaded.
    pub fn new_unchecked(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Verify the executable exists and has an execute bit set.
    pub fn check(&self) -> Result<(), HardValidationError> {
        if !self.0.exists() {
            return Err(HardValidationError::WorkerPathNotFound {
                path: self.0.clone(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = self.0.metadata() {
                if metadata.permissions().mode() & 0o111 == 0 {
                    return Err(HardValidationError::WorkerNotExecutable {
                        path: self.0.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for WorkerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
