// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Every field has a default matching the host VMM's expectations, so a
//! guest image normally boots without any configuration file. Any invalid
//! field results in a HardValidationError before the first boot signal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GuestError, GuestResult, HardValidationError};
use crate::frame::OversizePolicy;
use crate::types::{IoPortAddr, WorkerPath};

/// Upper bound for any worker timeout: 15 minutes.
const MAX_TIMEOUT_MS: u64 = 900_000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBootConfig {
    #[serde(default = "default_io_port")]
    io_port: u16,
    #[serde(default = "default_ready_signal")]
    cpu_ready_signal: u32,
    #[serde(default = "default_ready_signal")]
    primary_ready_signal: u32,
    #[serde(default = "default_requests_ready_signal")]
    requests_ready_signal: u32,
}

fn default_io_port() -> u16 {
    0x3f0
}

fn default_ready_signal() -> u32 {
    124
}

fn default_requests_ready_signal() -> u32 {
    126
}

impl Default for RawBootConfig {
    fn default() -> Self {
        Self {
            io_port: default_io_port(),
            cpu_ready_signal: default_ready_signal(),
            primary_ready_signal: default_ready_signal(),
            requests_ready_signal: default_requests_ready_signal(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMountConfig {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_mount_source")]
    source: String,
    #[serde(default = "default_mount_target")]
    target: String,
    #[serde(default = "default_fstype")]
    fstype: String,
}

fn default_true() -> bool {
    true
}

fn default_mount_source() -> String {
    "/dev/vdb".to_string()
}

fn default_mount_target() -> String {
    "/srv".to_string()
}

fn default_fstype() -> String {
    "ext4".to_string()
}

impl Default for RawMountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: default_mount_source(),
            target: default_mount_target(),
            fstype: default_fstype(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTransportConfig {
    #[serde(default = "default_device")]
    device: String,
    #[serde(default = "default_true")]
    raw_mode: bool,
}

fn default_device() -> String {
    "/dev/ttyS1".to_string()
}

impl Default for RawTransportConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            raw_mode: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkerConfig {
    #[serde(default = "default_worker_path")]
    path: String,
    #[serde(default = "default_response_timeout")]
    response_timeout_ms: u64,
    #[serde(default = "default_exit_timeout")]
    exit_timeout_ms: u64,
    #[serde(default)]
    oversize: OversizePolicy,
}

fn default_worker_path() -> String {
    "/srv/workload".to_string()
}

fn default_response_timeout() -> u64 {
    30_000
}

fn default_exit_timeout() -> u64 {
    5_000
}

impl Default for RawWorkerConfig {
    fn default() -> Self {
        Self {
            path: default_worker_path(),
            response_timeout_ms: default_response_timeout(),
            exit_timeout_ms: default_exit_timeout(),
            oversize: OversizePolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntropyConfig {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_random_device")]
    device: String,
    #[serde(default = "default_credit_bits")]
    credit_bits: i32,
}

fn default_random_device() -> String {
    "/dev/random".to_string()
}

fn default_credit_bits() -> i32 {
    10_241_024
}

impl Default for RawEntropyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: default_random_device(),
            credit_bits: default_credit_bits(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    boot: RawBootConfig,
    #[serde(default)]
    mount: RawMountConfig,
    #[serde(default)]
    transport: RawTransportConfig,
    #[serde(default)]
    worker: RawWorkerConfig,
    #[serde(default)]
    entropy: RawEntropyConfig,
}

/// Hypervisor handshake settings.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub io_port: IoPortAddr,
    pub cpu_ready_signal: u32,
    pub primary_ready_signal: u32,
    pub requests_ready_signal: u32,
}

/// Function filesystem mount settings.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub enabled: bool,
    pub source: PathBuf,
    pub target: PathBuf,
    pub fstype: String,
}

/// Serial transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub device: PathBuf,
    pub raw_mode: bool,
}

/// Per-request worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub path: WorkerPath,
    pub response_timeout: Duration,
    pub exit_timeout: Duration,
    pub oversize: OversizePolicy,
}

/// Advisory entropy seeding settings.
#[derive(Debug, Clone)]
pub struct EntropyConfig {
    pub enabled: bool,
    pub device: PathBuf,
    pub credit_bits: i32,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub boot: BootConfig,
    pub mount: MountConfig,
    pub transport: TransportConfig,
    pub worker: WorkerConfig,
    pub entropy: EntropyConfig,
}

impl Default for Config {
    fn default() -> Self {
        // The built-in defaults are known to pass validation.
        match ConfigLoader::validate(RawConfig::default()) {
            Ok(config) => config,
            Err(e) => unreachable!("default configuration is invalid: {}", e),
        }
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> GuestResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(GuestError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GuestError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load the file if one was given, otherwise use the built-in defaults.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> GuestResult<Config> {
        match path {
            Some(path) => Self::load_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> GuestResult<Config> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| GuestError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> GuestResult<Config> {
        Ok(Config {
            boot: Self::validate_boot(raw.boot)?,
            mount: Self::validate_mount(raw.mount)?,
            transport: Self::validate_transport(raw.transport)?,
            worker: Self::validate_worker(raw.worker)?,
            entropy: Self::validate_entropy(raw.entropy)?,
        })
    }

    fn validate_boot(raw: RawBootConfig) -> GuestResult<BootConfig> {
        let io_port = IoPortAddr::new(raw.io_port)?;

        // The host tells readiness apart from request-readiness by value alone.
        for (name, value) in [
            ("cpu_ready_signal", raw.cpu_ready_signal),
            ("primary_ready_signal", raw.primary_ready_signal),
        ] {
            if value == raw.requests_ready_signal {
                return Err(HardValidationError::SignalCollision {
                    first: name,
                    second: "requests_ready_signal",
                    value,
                }
                .into());
            }
        }

        Ok(BootConfig {
            io_port,
            cpu_ready_signal: raw.cpu_ready_signal,
            primary_ready_signal: raw.primary_ready_signal,
            requests_ready_signal: raw.requests_ready_signal,
        })
    }

    fn validate_mount(raw: RawMountConfig) -> GuestResult<MountConfig> {
        for (field, value) in [
            ("mount.source", &raw.source),
            ("mount.target", &raw.target),
            ("mount.fstype", &raw.fstype),
        ] {
            if value.is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: String::new(),
                    reason: "Must not be empty".to_string(),
                }
                .into());
            }
        }

        if !Path::new(&raw.target).is_absolute() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "mount.target",
                value: raw.target,
                reason: "Mount point must be an absolute path".to_string(),
            }
            .into());
        }

        Ok(MountConfig {
            enabled: raw.enabled,
            source: PathBuf::from(raw.source),
            target: PathBuf::from(raw.target),
            fstype: raw.fstype,
        })
    }

    fn validate_transport(raw: RawTransportConfig) -> GuestResult<TransportConfig> {
        if raw.device.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "transport.device",
                value: String::new(),
                reason: "Must not be empty".to_string(),
            }
            .into());
        }

        Ok(TransportConfig {
            device: PathBuf::from(raw.device),
            raw_mode: raw.raw_mode,
        })
    }

    fn validate_worker(raw: RawWorkerConfig) -> GuestResult<WorkerConfig> {
        if raw.path.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "worker.path",
                value: String::new(),
                reason: "Must not be empty".to_string(),
            }
            .into());
        }

        let response_timeout =
            Self::validate_timeout("worker.response_timeout_ms", raw.response_timeout_ms)?;
        let exit_timeout = Self::validate_timeout("worker.exit_timeout_ms", raw.exit_timeout_ms)?;

        Ok(WorkerConfig {
            // Existence is checked at spawn time, after the mount.
            path: WorkerPath::new_unchecked(raw.path),
            response_timeout,
            exit_timeout,
            oversize: raw.oversize,
        })
    }

    fn validate_timeout(field: &'static str, ms: u64) -> GuestResult<Duration> {
        if ms == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: "0".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if ms > MAX_TIMEOUT_MS {
            return Err(HardValidationError::InvalidFieldValue {
                field,
                value: ms.to_string(),
                reason: format!("Timeout must not exceed {}ms", MAX_TIMEOUT_MS),
            }
            .into());
        }

        Ok(Duration::from_millis(ms))
    }

    fn validate_entropy(raw: RawEntropyConfig) -> GuestResult<EntropyConfig> {
        if raw.enabled && raw.credit_bits <= 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "entropy.credit_bits",
                value: raw.credit_bits.to_string(),
                reason: "Must be positive when entropy seeding is enabled".to_string(),
            }
            .into());
        }

        Ok(EntropyConfig {
            enabled: raw.enabled,
            device: PathBuf::from(raw.device),
            credit_bits: raw.credit_bits,
        })
    }
}
