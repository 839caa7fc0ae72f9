use serde::{Deserialize, Serialize};

/// Type of managed worker process (§4.7). Only `RqWorker` participates in
/// cluster-registration bulk restart; stream consumers don't register in
/// the worker namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    RqWorker,
    StreamConsumer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default = "d_worker_type")]
    pub worker_type: WorkerType,
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default = "d_true")]
    pub restart_on_failure: bool,
    /// Only meaningful for `StreamConsumer` workers tied to a specific STT
    /// provider id (conditional enablement, see worker_registry grounding).
    #[serde(default)]
    pub requires_provider: Option<String>,
}

fn d_worker_type() -> WorkerType {
    WorkerType::RqWorker
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "d_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "d_min_rq_workers")]
    pub min_rq_workers: usize,
    #[serde(default = "d_startup_grace")]
    pub startup_grace_period_secs: u64,
    #[serde(default = "d_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "d_cooldown")]
    pub registration_recovery_cooldown_secs: u64,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: d_check_interval(),
            min_rq_workers: d_min_rq_workers(),
            startup_grace_period_secs: d_startup_grace(),
            shutdown_timeout_secs: d_shutdown_timeout(),
            registration_recovery_cooldown_secs: d_cooldown(),
            workers: Vec::new(),
        }
    }
}

fn d_check_interval() -> u64 {
    10
}
fn d_min_rq_workers() -> usize {
    6
}
fn d_startup_grace() -> u64 {
    30
}
fn d_shutdown_timeout() -> u64 {
    30
}
fn d_cooldown() -> u64 {
    60
}
fn d_true() -> bool {
    true
}
