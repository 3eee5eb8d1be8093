// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! snapguest
//!
//! Init process for snapshot microVMs: reports CPU readiness to the
//! hypervisor, mounts the function filesystem and serves invocation
//! requests over the serial link.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// snapguest - microVM guest init and request dispatcher
#[derive(Parser)]
#[command(name = "snapguest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full guest boot sequence and serve requests forever (default)
    Boot,

    /// Serve requests without the hypervisor handshake or mount
    Serve {
        /// Path to read requests from (defaults to the configured device)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Path to write responses to (defaults to the input path)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Probe the CPU count by affinity pinning, without port I/O
    ProbeCpus,

    /// Credit the kernel entropy pool once
    SeedEntropy,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; the serial transport never carries logs.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command.unwrap_or(Commands::Boot) {
        Commands::Boot => commands::boot::execute(cli.config.as_deref()).await,
        Commands::Serve { input, output } => {
            commands::serve::execute(cli.config.as_deref(), input, output).await
        }
        Commands::ProbeCpus => commands::probe::execute(),
        Commands::SeedEntropy => commands::seed_entropy::execute(cli.config.as_deref()),
        Commands::Validate { file } => commands::validate::execute(&file),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "snapguest failed");
    }
    result
}
