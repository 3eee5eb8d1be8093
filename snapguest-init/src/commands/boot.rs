// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `snapguest boot` - the init sequence.
//!
//! entropy → CPU readiness → mount → transport → requests ready → dispatch.

use std::path::Path;

use snapguest_core::boot::{IoPort, SchedAffinity};
use snapguest_core::entropy::seed_entropy_advisory;
use snapguest_core::mount::mount_function_fs;
use snapguest_core::{BootSignaler, ConfigLoader, Dispatcher, SignalValues, Transport};

pub async fn execute(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    // Load and validate configuration - fail fast before any boot signal
    let config = ConfigLoader::load_or_default(config_path)?;

    tracing::info!(
        config = ?config_path.map(|p| p.display().to_string()),
        "Starting guest boot sequence"
    );

    seed_entropy_advisory(&config.entropy);

    // Without port privilege the host can never snapshot this VM.
    let port = IoPort::acquire()?;
    let mut signaler =
        BootSignaler::new(port, SchedAffinity::new(), SignalValues::from(&config.boot));

    let report = signaler.announce_cpus();
    tracing::info!(
        cpus = report.cpus,
        stop = ?report.stop,
        "CPU readiness reported"
    );

    mount_function_fs(&config.mount)?;

    // A broken worker still gets the empty frame per request; say so early.
    if let Err(e) = config.worker.path.check() {
        tracing::warn!(error = %e, "Worker is not runnable");
    }

    let (reader, writer) = Transport::open(&config.transport)?.into_split();
    signaler.requests_ready();

    let mut dispatcher = Dispatcher::new(reader, writer, &config.worker);
    match dispatcher.run().await {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(
                error = %e,
                stats = ?dispatcher.stats(),
                "Dispatch loop terminated"
            );
            Err(e.into())
        }
    }
}
