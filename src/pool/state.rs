//! Worker state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, no task started yet.
    #[default]
    Idle,
    /// Working through its slice.
    Active,
    /// Slice exhausted, whatever the mix of successes and failures.
    Completed,
    /// Reserved for escalating worker-level failures. The pool never enters it.
    Error,
}

impl WorkerState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, target),
            (Idle, Active) | (Active, Completed) | (Idle, Error) | (Active, Error)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        assert!(WorkerState::Idle.can_transition_to(WorkerState::Active));
        assert!(WorkerState::Active.can_transition_to(WorkerState::Completed));
        assert!(WorkerState::Active.can_transition_to(WorkerState::Error));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!WorkerState::Idle.can_transition_to(WorkerState::Completed));
        assert!(!WorkerState::Completed.can_transition_to(WorkerState::Active));
        assert!(!WorkerState::Completed.can_transition_to(WorkerState::Idle));
        assert!(!WorkerState::Error.can_transition_to(WorkerState::Active));
    }

    #[test]
    fn terminal_states() {
        assert!(WorkerState::Completed.is_terminal());
        assert!(WorkerState::Error.is_terminal());
        assert!(!WorkerState::Idle.is_terminal());
        assert!(!WorkerState::Active.is_terminal());
    }

    #[test]
    fn state_display_matches_serde() {
        for state in [
            WorkerState::Idle,
            WorkerState::Active,
            WorkerState::Completed,
            WorkerState::Error,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
