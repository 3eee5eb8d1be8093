// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `snapguest serve` - dispatch loop only.
//!
//! Skips port I/O and the mount so the dispatcher can run on a host,
//! typically against a pair of FIFOs or a pty.

use std::path::{Path, PathBuf};

use snapguest_core::{ConfigLoader, Dispatcher, GuestError, Transport};

pub async fn execute(
    config_path: Option<&Path>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(config_path)?;

    let input = input.unwrap_or_else(|| config.transport.device.clone());
    let output = output.unwrap_or_else(|| input.clone());

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        worker = %config.worker.path,
        "Serving without boot handshake"
    );

    if let Err(e) = config.worker.path.check() {
        tracing::warn!(error = %e, "Worker is not runnable");
    }

    let transport = Transport::open_split(&input, &output, config.transport.raw_mode)?;
    let (reader, writer) = transport.into_split();

    let mut dispatcher = Dispatcher::new(reader, writer, &config.worker);
    match dispatcher.run().await {
        Ok(never) => match never {},
        // A closed input is a normal end when serving from a file or FIFO.
        Err(GuestError::TransportClosed) => {
            tracing::info!(stats = ?dispatcher.stats(), "Input closed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
