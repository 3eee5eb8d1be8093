// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `snapguest seed-entropy` - one-shot entropy credit.

use std::path::Path;

use snapguest_core::entropy::credit_entropy;
use snapguest_core::ConfigLoader;

pub fn execute(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(config_path)?;
    credit_entropy(&config.entropy)?;
    Ok(())
}
