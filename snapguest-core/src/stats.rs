// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use serde::{Deserialize, Serialize};

/// Counters kept by the dispatch loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Completed request cycles.
    pub cycles: u64,
    /// Cycles that delivered a worker's output.
    pub responses: u64,
    pub spawn_failures: u64,
    pub empty_outputs: u64,
    pub response_timeouts: u64,
    pub read_failures: u64,
    /// Responses longer than one frame.
    pub oversize: u64,
    /// Workers killed after answering because they would not exit.
    pub exit_timeouts: u64,
}

impl DispatchStats {
    /// Cycles answered with the empty error frame.
    pub fn error_responses(&self) -> u64 {
        self.cycles - self.responses
    }
}
