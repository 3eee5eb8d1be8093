// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Direct I/O port access for hypervisor signals.

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
use nix::errno::Errno;

use crate::error::BootError;
use crate::types::IoPortAddr;

/// Sink for 32-bit boot signal writes.
pub trait PortIo {
    /// Write one 32-bit value to `port`.
    fn write_u32(&mut self, port: IoPortAddr, value: u32) -> std::io::Result<()>;
}

/// Real port I/O through `outl`.
///
/// Construction raises the I/O privilege level, so holding an `IoPort`
/// proves the process may execute port instructions.
#[derive(Debug)]
pub struct IoPort {
    _privileged: (),
}

impl IoPort {
    /// Acquire port I/O privilege (`iopl(3)`).
    ///
    /// # Errors
    /// Returns `BootError::PortPrivilege` if the kernel refuses, which is
    /// fatal for the boot handshake.
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    pub fn acquire() -> Result<Self, BootError> {
        // SAFETY: iopl only changes this process's I/O privilege level.
        let ret = unsafe { libc::syscall(libc::SYS_iopl, 3 as libc::c_long) };
        if ret < 0 {
            return Err(BootError::PortPrivilege {
                source: Errno::last(),
            });
        }

        tracing::debug!("Acquired port I/O privilege");
        Ok(Self { _privileged: () })
    }

    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    pub fn acquire() -> Result<Self, BootError> {
        Err(BootError::PortIoUnsupported)
    }
}

impl PortIo for IoPort {
    #[cfg(target_arch = "x86_64")]
    fn write_u32(&mut self, port: IoPortAddr, value: u32) -> std::io::Result<()> {
        // SAFETY: privilege was raised in acquire(); the port is the
        // hypervisor's signal port and has no memory side effects.
        unsafe {
            std::arch::asm!(
                "out dx, eax",
                in("dx") port.value(),
                in("eax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Ok(())
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn write_u32(&mut self, _port: IoPortAddr, _value: u32) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}

/// Port that only logs and counts writes.
///
/// Used to exercise the CPU probe outside a microVM.
#[derive(Debug, Default)]
pub struct DryRunPort {
    writes: Vec<(IoPortAddr, u32)>,
}

impl DryRunPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write seen so far, in order.
    pub fn writes(&self) -> &[(IoPortAddr, u32)] {
        &self.writes
    }
}

impl PortIo for DryRunPort {
    fn write_u32(&mut self, port: IoPortAddr, value: u32) -> std::io::Result<()> {
        tracing::debug!(port = %port, value = value, "Dry-run port write");
        self.writes.push((port, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_records_writes() {
        let port = IoPortAddr::new(0x3f0).unwrap();
        let mut dry = DryRunPort::new();
        dry.write_u32(port, 124).unwrap();
        dry.write_u32(port, 126).unwrap();
        assert_eq!(dry.writes(), &[(port, 124), (port, 126)]);
    }

    #[test]
    fn test_acquire_does_not_panic() {
        // Unprivileged test runs get EPERM; both outcomes are fine here.
        match IoPort::acquire() {
            Ok(_) => {}
            Err(BootError::PortPrivilege { .. }) => {}
            Err(BootError::PortIoUnsupported) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
}
