// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Dispatch loop state machine with typed state transitions.
//!
//! Implements the request cycle:
//! AwaitingRequest → Dispatching → AwaitingResponse → Responding → AwaitingRequest.
//! There is no terminal state. Invalid transitions result in StateTransitionError.

use crate::error::StateTransitionError;

/// Dispatch loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Blocked on the inbound stream for the next request line.
    AwaitingRequest,

    /// Spawning the worker for the current request.
    Dispatching,

    /// Waiting for the worker's output line.
    AwaitingResponse,

    /// Writing the framed response and reaping the worker.
    Responding,
}

impl DispatchState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AwaitingRequest => "AwaitingRequest",
            Self::Dispatching => "Dispatching",
            Self::AwaitingResponse => "AwaitingResponse",
            Self::Responding => "Responding",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: DispatchState) -> bool {
        matches!(
            (self, target),
            (Self::AwaitingRequest, Self::Dispatching) |
            (Self::Dispatching, Self::AwaitingResponse) |
            // Spawn failure skips straight to the error response
            (Self::Dispatching, Self::Responding) |
            (Self::AwaitingResponse, Self::Responding) |
            (Self::Responding, Self::AwaitingRequest)
        )
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for the dispatch loop.
/// Enforces valid transitions; counting is left to `DispatchStats`.
#[derive(Debug)]
pub struct DispatchStateMachine {
    current_state: DispatchState,
}

impl DispatchStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: DispatchState::AwaitingRequest,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.current_state
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: DispatchState) -> Result<(), StateTransitionError> {
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::trace!(
            from = self.current_state.name(),
            to = target.name(),
            "Dispatch transition"
        );

        self.current_state = target;
        Ok(())
    }
}

impl Default for DispatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = DispatchStateMachine::new();
        assert_eq!(sm.state(), DispatchState::AwaitingRequest);
    }

    #[test]
    fn test_full_cycle() {
        let mut sm = DispatchStateMachine::new();

        sm.transition_to(DispatchState::Dispatching).unwrap();
        assert_eq!(sm.state(), DispatchState::Dispatching);
        sm.transition_to(DispatchState::AwaitingResponse).unwrap();
        sm.transition_to(DispatchState::Responding).unwrap();
        sm.transition_to(DispatchState::AwaitingRequest).unwrap();

        assert_eq!(sm.state(), DispatchState::AwaitingRequest);
    }

    #[test]
    fn test_spawn_failure_shortcut() {
        let mut sm = DispatchStateMachine::new();
        sm.transition_to(DispatchState::Dispatching).unwrap();
        assert!(sm.transition_to(DispatchState::Responding).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = DispatchStateMachine::new();

        // Cannot respond before dispatching
        let result = sm.transition_to(DispatchState::Responding);
        assert!(result.is_err());

        // Cannot read a new request while a worker is outstanding
        sm.transition_to(DispatchState::Dispatching).unwrap();
        sm.transition_to(DispatchState::AwaitingResponse).unwrap();
        assert!(sm.transition_to(DispatchState::AwaitingRequest).is_err());
        assert!(sm.transition_to(DispatchState::Dispatching).is_err());
    }

    #[test]
    fn test_error_message_names_states() {
        let mut sm = DispatchStateMachine::new();
        let err = sm.transition_to(DispatchState::AwaitingResponse).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("AwaitingRequest"));
        assert!(msg.contains("AwaitingResponse"));
    }
}
