//! Worker state machine (§4.7), grounded on
//! `original_source/.../workers/orchestrator/process_manager.py`'s
//! `WorkerState` enum.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Pending,
    Starting,
    Running,
    Unhealthy,
    Stopping,
    Stopped,
    Failed,
}

impl WorkerState {
    /// Valid transitions, enforced by `ManagedWorker` rather than left
    /// implicit — a worker can't jump from `Pending` to `Unhealthy` etc.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Unhealthy)
                | (Running, Stopping)
                | (Unhealthy, Stopping)
                | (Unhealthy, Running)
                | (Stopping, Stopped)
                | (Stopping, Failed)
                | (_, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }

    pub fn is_live(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Unhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_only_start() {
        assert!(WorkerState::Pending.can_transition_to(WorkerState::Starting));
        assert!(!WorkerState::Pending.can_transition_to(WorkerState::Running));
    }

    #[test]
    fn any_state_can_fail() {
        assert!(WorkerState::Running.can_transition_to(WorkerState::Failed));
        assert!(WorkerState::Starting.can_transition_to(WorkerState::Failed));
    }

    #[test]
    fn unhealthy_can_recover_to_running() {
        assert!(WorkerState::Unhealthy.can_transition_to(WorkerState::Running));
    }
}
