// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `snapguest probe-cpus` - run the CPU probe with a dry-run port.

use snapguest_core::boot::{DryRunPort, SchedAffinity};
use snapguest_core::config::Config;
use snapguest_core::{BootSignaler, SignalValues};

pub fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let mut signaler = BootSignaler::new(
        DryRunPort::new(),
        SchedAffinity::new(),
        SignalValues::from(&config.boot),
    );

    let report = signaler.announce_cpus();

    println!("CPUs discovered:      {}", report.cpus);
    println!("CpuReady signals:     {}", report.cpu_ready_signals);
    println!("Probe stopped by:     {:?}", report.stop);
    println!("Port writes recorded: {}", signaler.port().writes().len());

    Ok(())
}
