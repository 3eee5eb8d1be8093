// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `snapguest validate` command - Validate configuration file.

use std::path::Path;

use snapguest_core::ConfigLoader;

pub fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Boot Handshake:");
            println!("  I/O Port:           {}", config.boot.io_port);
            println!(
                "  Signals:            cpu={} primary={} requests={}",
                config.boot.cpu_ready_signal,
                config.boot.primary_ready_signal,
                config.boot.requests_ready_signal
            );
            println!();
            println!("Function Filesystem:");
            if config.mount.enabled {
                println!(
                    "  {} → {} ({}, read-only)",
                    config.mount.source.display(),
                    config.mount.target.display(),
                    config.mount.fstype
                );
            } else {
                println!("  (mount disabled)");
            }
            println!();
            println!("Transport:");
            println!(
                "  Device:             {} (raw: {})",
                config.transport.device.display(),
                config.transport.raw_mode
            );
            println!();
            println!("Worker:");
            println!("  Path:               {}", config.worker.path);
            println!(
                "  Response Timeout:   {}ms",
                config.worker.response_timeout.as_millis()
            );
            println!(
                "  Exit Timeout:       {}ms",
                config.worker.exit_timeout.as_millis()
            );
            println!("  Oversize Policy:    {:?}", config.worker.oversize);
            println!();
            println!(
                "Entropy Seeding:      {}",
                if config.entropy.enabled {
                    format!(
                        "{} bits via {}",
                        config.entropy.credit_bits,
                        config.entropy.device.display()
                    )
                } else {
                    "disabled".to_string()
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            Err(e.into())
        }
    }
}
