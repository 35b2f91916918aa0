//! Worker state machine
//!
//! ```text
//! Starting ──▶ Idle ──▶ Running ──▶ Completed ──▶ Idle
//!                          │
//!                          ├──▶ Killed   (timeout, crash)
//!                          └──▶ Retired  (max tasks reached, shutdown)
//! ```

use serde::{Deserialize, Serialize};

/// Possible states of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    /// Spawned, waiting for the `Ready` handshake
    Starting,

    /// Waiting for a task
    Idle,

    /// Running a task
    Running,

    /// Finished a task, about to go back to idle or be retired
    Completed,

    /// Force-killed or died on its own
    Killed,

    /// Shut down cleanly
    Retired,
}

impl WorkerState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Killed | WorkerState::Retired)
    }

    /// Check if the worker can take a task
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerState::Idle)
    }

    /// Whether `next` is a legal transition from this state
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Starting, Idle) => true,
            (Idle, Running) => true,
            (Running, Completed) => true,
            (Completed, Idle) => true,
            (Completed, Retired) | (Idle, Retired) => true,
            // 어느 상태에서든 강제 종료 가능
            (s, Killed) => !s.is_terminal(),
            _ => false,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkerState::Starting => "Starting",
            WorkerState::Idle => "Idle",
            WorkerState::Running => "Running",
            WorkerState::Completed => "Completed",
            WorkerState::Killed => "Killed",
            WorkerState::Retired => "Retired",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            WorkerState::Starting,
            WorkerState::Idle,
            WorkerState::Running,
            WorkerState::Completed,
            WorkerState::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkerState::Killed.is_terminal());
        assert!(WorkerState::Retired.is_terminal());
        assert!(!WorkerState::Killed.can_transition_to(WorkerState::Idle));
        assert!(!WorkerState::Retired.can_transition_to(WorkerState::Killed));
        assert!(WorkerState::Running.can_transition_to(WorkerState::Killed));
        assert!(!WorkerState::Running.can_transition_to(WorkerState::Idle));
    }
}
