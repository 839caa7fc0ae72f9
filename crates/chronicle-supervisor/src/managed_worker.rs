//! `ManagedWorker`: owns one worker subprocess and its health bookkeeping
//! (§4.7), grounded on `process_manager.py`'s `ManagedWorker`
//! (start/stop/check_health) but using `tokio::process::Command` in place
//! of Python's `subprocess.Popen`.

use std::time::{Duration, Instant};

use chronicle_domain::config::WorkerConfig;
use chronicle_domain::{Error, Result};
use tokio::process::{Child, Command};

use crate::state::WorkerState;

pub struct ManagedWorker {
    pub config: WorkerConfig,
    pub state: WorkerState,
    pub restart_count: u32,
    pub last_started_at: Option<Instant>,
    pub last_stopped_at: Option<Instant>,
    child: Option<Child>,
}

impl ManagedWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: WorkerState::Pending,
            restart_count: 0,
            last_started_at: None,
            last_stopped_at: None,
            child: None,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                worker = %self.config.name,
                from = ?self.state,
                to = ?next,
                "unexpected worker state transition"
            );
        }
        self.state = next;
    }

    /// Spawn the worker's subprocess. Returns the elapsed time to get a
    /// live child handle (not full readiness — that's `check_health`).
    pub async fn start(&mut self) -> Result<Duration> {
        self.transition(WorkerState::Starting);
        let started = Instant::now();

        let Some((program, args)) = self.config.command.split_first() else {
            self.transition(WorkerState::Failed);
            return Err(Error::Config(format!(
                "worker {} has an empty command",
                self.config.name
            )));
        };

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::Io)?;

        self.child = Some(child);
        self.last_started_at = Some(started);
        self.transition(WorkerState::Running);
        Ok(started.elapsed())
    }

    /// Ask the subprocess to exit, escalating to a hard kill if it doesn't
    /// within `timeout`. Returns elapsed stop time.
    pub async fn stop(&mut self, timeout: Duration) -> Result<Duration> {
        self.transition(WorkerState::Stopping);
        let stopped = Instant::now();

        let Some(child) = self.child.as_mut() else {
            self.transition(WorkerState::Stopped);
            return Ok(Duration::ZERO);
        };

        // No portable graceful-signal primitive in this crate's dependency
        // stack; rely on the exit race below and hard-kill on timeout.
        let wait = tokio::time::timeout(timeout, child.wait()).await;
        match wait {
            Ok(_) => {
                self.transition(WorkerState::Stopped);
            }
            Err(_) => {
                tracing::warn!(worker = %self.config.name, "graceful stop timed out, killing");
                let _ = child.kill().await;
                self.transition(WorkerState::Stopped);
            }
        }

        self.child = None;
        self.last_stopped_at = Some(stopped);
        Ok(stopped.elapsed())
    }

    /// Liveness check: has the child process exited unexpectedly?
    pub fn check_health(&mut self) -> WorkerState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(_status)) => {
                    self.transition(WorkerState::Unhealthy);
                }
                Ok(None) => {
                    if self.state == WorkerState::Unhealthy {
                        self.transition(WorkerState::Running);
                    }
                }
                Err(e) => {
                    tracing::warn!(worker = %self.config.name, error = %e, "health check failed");
                    self.transition(WorkerState::Unhealthy);
                }
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::config::WorkerType;

    fn cfg() -> WorkerConfig {
        WorkerConfig {
            name: "test-worker".into(),
            command: vec!["true".into()],
            worker_type: WorkerType::RqWorker,
            queues: vec!["default".into()],
            restart_on_failure: true,
            requires_provider: None,
        }
    }

    #[test]
    fn starts_pending() {
        let worker = ManagedWorker::new(cfg());
        assert_eq!(worker.state, WorkerState::Pending);
    }

    #[tokio::test]
    async fn empty_command_fails_to_start() {
        let mut worker = ManagedWorker::new(WorkerConfig {
            command: vec![],
            ..cfg()
        });
        let result = worker.start().await;
        assert!(result.is_err());
        assert_eq!(worker.state, WorkerState::Failed);
    }
}
