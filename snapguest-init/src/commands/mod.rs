// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod boot;
pub mod probe;
pub mod seed_entropy;
pub mod serve;
pub mod validate;
