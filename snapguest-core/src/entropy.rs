// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Kernel entropy pool seeding.
//!
//! A freshly booted microVM has almost no entropy, and a snapshot taken in
//! that state would block every restored clone on `getrandom`. Crediting
//! the pool is advisory: failures are logged and boot continues.

use std::fs::File;
use std::os::unix::io::AsRawFd;

use crate::config::EntropyConfig;
use crate::error::GuestError;

// RNDADDTOENTCNT = _IOW('R', 0x01, int)
nix::ioctl_write_ptr!(rnd_add_to_ent_cnt, b'R', 0x01, libc::c_int);

/// Credit `config.credit_bits` bits to the kernel random pool.
pub fn credit_entropy(config: &EntropyConfig) -> Result<(), GuestError> {
    let random = File::open(&config.device).map_err(|e| GuestError::Io {
        context: "opening random device",
        source: e,
    })?;

    let amount: libc::c_int = config.credit_bits;
    // SAFETY: the fd is open for the duration of the call and `amount`
    // outlives it.
    unsafe { rnd_add_to_ent_cnt(random.as_raw_fd(), &amount) }.map_err(|source| {
        GuestError::Syscall {
            syscall: "ioctl(RNDADDTOENTCNT)",
            source,
        }
    })?;

    tracing::info!(bits = amount, "Credited kernel entropy pool");
    Ok(())
}

/// Run [`credit_entropy`] if enabled, logging instead of failing.
pub fn seed_entropy_advisory(config: &EntropyConfig) {
    if !config.enabled {
        tracing::debug!("Entropy seeding disabled");
        return;
    }

    if let Err(e) = credit_entropy(config) {
        tracing::warn!(error = %e, "Entropy seeding failed, continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_device_is_io_error() {
        let config = EntropyConfig {
            enabled: true,
            device: PathBuf::from("/nonexistent/random"),
            credit_bits: 8,
        };
        assert!(matches!(
            credit_entropy(&config),
            Err(GuestError::Io { .. })
        ));
    }

    #[test]
    fn test_ioctl_on_regular_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = EntropyConfig {
            enabled: true,
            device: file.path().to_path_buf(),
            credit_bits: 8,
        };
        assert!(matches!(
            credit_entropy(&config),
            Err(GuestError::Syscall { .. })
        ));
    }

    #[test]
    fn test_advisory_never_panics() {
        let config = EntropyConfig {
            enabled: true,
            device: PathBuf::from("/nonexistent/random"),
            credit_bits: 8,
        };
        seed_entropy_advisory(&config);
    }
}
