// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Function filesystem mount.

use nix::mount::{mount, MsFlags};

use crate::config::MountConfig;
use crate::error::BootError;

/// Mount the read-only block device carrying the function code.
///
/// # Errors
/// Any mount failure is fatal: the worker cannot be executed without it.
pub fn mount_function_fs(config: &MountConfig) -> Result<(), BootError> {
    if !config.enabled {
        tracing::info!("Function filesystem mount disabled");
        return Ok(());
    }

    mount(
        Some(config.source.as_path()),
        config.target.as_path(),
        Some(config.fstype.as_str()),
        MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .map_err(|source| BootError::Mount {
        source_dev: config.source.clone(),
        target: config.target.clone(),
        source,
    })?;

    tracing::info!(
        source = %config.source.display(),
        target = %config.target.display(),
        fstype = %config.fstype,
        "Mounted function filesystem read-only"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(enabled: bool, target: PathBuf) -> MountConfig {
        MountConfig {
            enabled,
            source: PathBuf::from("/nonexistent/snapguest-vdb"),
            target,
            fstype: "ext4".to_string(),
        }
    }

    #[test]
    fn test_disabled_is_noop() {
        assert!(mount_function_fs(&config(false, PathBuf::from("/srv"))).is_ok());
    }

    #[test]
    fn test_missing_device_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = mount_function_fs(&config(true, dir.path().to_path_buf()));
        // ENOENT as root, EPERM otherwise.
        assert!(matches!(result, Err(BootError::Mount { .. })));
    }
}
