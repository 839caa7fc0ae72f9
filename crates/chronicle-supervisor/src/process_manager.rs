//! `ProcessManager`: owns the full worker registry (§4.7), grounded on
//! `process_manager.py`'s `ProcessManager` (`start_all`/`stop_all`/
//! `restart_worker` with stop/start timing breakdown, `get_status`).

use std::time::Duration;

use chronicle_domain::Result;
use tokio::sync::RwLock;

use crate::managed_worker::ManagedWorker;
use crate::state::WorkerState;

pub struct ProcessManager {
    workers: RwLock<Vec<ManagedWorker>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub state: WorkerState,
    pub restart_count: u32,
    pub worker_type: chronicle_domain::config::WorkerType,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RestartTiming {
    pub stop_elapsed: Duration,
    pub start_elapsed: Duration,
}

impl ProcessManager {
    pub fn new(workers: Vec<ManagedWorker>) -> Self {
        Self {
            workers: RwLock::new(workers),
        }
    }

    /// Start every managed worker, logging the slowest and fastest start
    /// time (§4.7's timing-breakdown requirement).
    pub async fn start_all(&self) -> Result<()> {
        let mut workers = self.workers.write().await;
        let mut timings = Vec::with_capacity(workers.len());
        for worker in workers.iter_mut() {
            match worker.start().await {
                Ok(elapsed) => timings.push((worker.config.name.clone(), elapsed)),
                Err(e) => tracing::error!(worker = %worker.config.name, error = %e, "failed to start worker"),
            }
        }
        log_timing_extremes("start", &timings);
        Ok(())
    }

    pub async fn stop_all(&self, timeout: Duration) -> Result<()> {
        let mut workers = self.workers.write().await;
        let mut timings = Vec::with_capacity(workers.len());
        for worker in workers.iter_mut() {
            match worker.stop(timeout).await {
                Ok(elapsed) => timings.push((worker.config.name.clone(), elapsed)),
                Err(e) => tracing::error!(worker = %worker.config.name, error = %e, "failed to stop worker"),
            }
        }
        log_timing_extremes("stop", &timings);
        Ok(())
    }

    pub async fn restart_worker(
        &self,
        name: &str,
        stop_timeout: Duration,
    ) -> Result<Option<RestartTiming>> {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.iter_mut().find(|w| w.config.name == name) else {
            return Ok(None);
        };
        let stop_elapsed = worker.stop(stop_timeout).await?;
        let start_elapsed = worker.start().await?;
        worker.restart_count += 1;
        Ok(Some(RestartTiming {
            stop_elapsed,
            start_elapsed,
        }))
    }

    /// Bulk-restart every `RqWorker`-typed worker (§4.7: stream consumers
    /// never participate in cluster-registration recovery).
    pub async fn restart_all_rq_workers(&self, stop_timeout: Duration) -> Result<usize> {
        let mut workers = self.workers.write().await;
        let mut restarted = 0;
        for worker in workers
            .iter_mut()
            .filter(|w| w.config.worker_type == chronicle_domain::config::WorkerType::RqWorker)
        {
            worker.stop(stop_timeout).await?;
            worker.start().await?;
            worker.restart_count += 1;
            restarted += 1;
        }
        Ok(restarted)
    }

    pub async fn check_health(&self) -> Vec<WorkerStatus> {
        let mut workers = self.workers.write().await;
        workers
            .iter_mut()
            .map(|w| {
                w.check_health();
                WorkerStatus {
                    name: w.config.name.clone(),
                    state: w.state,
                    restart_count: w.restart_count,
                    worker_type: w.config.worker_type,
                }
            })
            .collect()
    }

    pub async fn get_status(&self) -> Vec<WorkerStatus> {
        let workers = self.workers.read().await;
        workers
            .iter()
            .map(|w| WorkerStatus {
                name: w.config.name.clone(),
                state: w.state,
                restart_count: w.restart_count,
                worker_type: w.config.worker_type,
            })
            .collect()
    }

    pub async fn rq_worker_count(&self) -> usize {
        let workers = self.workers.read().await;
        workers
            .iter()
            .filter(|w| {
                w.config.worker_type == chronicle_domain::config::WorkerType::RqWorker
                    && w.state.is_live()
            })
            .count()
    }
}

fn log_timing_extremes(phase: &str, timings: &[(String, Duration)]) {
    let Some((slowest_name, slowest)) = timings.iter().max_by_key(|(_, d)| *d) else {
        return;
    };
    let (fastest_name, fastest) = timings.iter().min_by_key(|(_, d)| *d).unwrap();
    tracing::info!(
        phase,
        slowest_worker = %slowest_name,
        slowest_ms = slowest.as_millis() as u64,
        fastest_worker = %fastest_name,
        fastest_ms = fastest.as_millis() as u64,
        "worker {phase} timing breakdown"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::config::{WorkerConfig, WorkerType};

    fn cfg(name: &str, worker_type: WorkerType) -> WorkerConfig {
        WorkerConfig {
            name: name.into(),
            command: vec!["true".into()],
            worker_type,
            queues: vec!["default".into()],
            restart_on_failure: true,
            requires_provider: None,
        }
    }

    #[tokio::test]
    async fn start_all_then_status_reflects_running_workers() {
        let manager = ProcessManager::new(vec![
            ManagedWorker::new(cfg("a", WorkerType::RqWorker)),
            ManagedWorker::new(cfg("b", WorkerType::StreamConsumer)),
        ]);
        manager.start_all().await.unwrap();
        let status = manager.get_status().await;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.state == WorkerState::Running));
    }

    #[tokio::test]
    async fn restart_all_rq_workers_skips_stream_consumers() {
        let manager = ProcessManager::new(vec![
            ManagedWorker::new(cfg("a", WorkerType::RqWorker)),
            ManagedWorker::new(cfg("b", WorkerType::StreamConsumer)),
        ]);
        manager.start_all().await.unwrap();
        let restarted = manager
            .restart_all_rq_workers(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(restarted, 1);
        let status = manager.get_status().await;
        let b = status.iter().find(|s| s.name == "b").unwrap();
        assert_eq!(b.restart_count, 0);
    }

    #[tokio::test]
    async fn rq_worker_count_counts_only_live_rq_workers() {
        let manager = ProcessManager::new(vec![
            ManagedWorker::new(cfg("a", WorkerType::RqWorker)),
            ManagedWorker::new(cfg("b", WorkerType::RqWorker)),
            ManagedWorker::new(cfg("c", WorkerType::StreamConsumer)),
        ]);
        manager.start_all().await.unwrap();
        assert_eq!(manager.rq_worker_count().await, 2);
    }
}
