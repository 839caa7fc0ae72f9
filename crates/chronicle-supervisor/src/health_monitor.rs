//! Cluster health monitor (§4.7), grounded on
//! `process_manager.py`'s registration-recovery loop: waits out a startup
//! grace period, then polls worker health and the RQ cluster's registered
//! worker count on a fixed cadence, bulk-restarting `RqWorker`s when the
//! registered count drops below `min_rq_workers`, gated by a cooldown so a
//! flapping cluster doesn't restart workers on every tick.

use std::sync::Arc;
use std::time::Duration;

use chronicle_domain::config::SupervisorConfig;
use chronicle_domain::{Error, Result};
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::process_manager::ProcessManager;

/// RQ workers register themselves as Redis keys under this namespace;
/// `rq.workers` mirrors the `rq` library's own worker-registration set.
const RQ_WORKERS_KEY: &str = "rq:workers";

pub struct HealthMonitor {
    manager: Arc<ProcessManager>,
    redis: ConnectionManager,
    config: SupervisorConfig,
    last_restart_at: Option<Instant>,
}

impl HealthMonitor {
    pub fn new(manager: Arc<ProcessManager>, redis: ConnectionManager, config: SupervisorConfig) -> Self {
        Self {
            manager,
            redis,
            config,
            last_restart_at: None,
        }
    }

    /// Query the number of members in the RQ worker-registration set.
    async fn registered_rq_worker_count(&mut self) -> Result<usize> {
        redis::cmd("SCARD")
            .arg(RQ_WORKERS_KEY)
            .query_async(&mut self.redis)
            .await
            .map_err(|e| Error::Redis(e.to_string()))
    }

    fn cooldown_elapsed(&self) -> bool {
        match self.last_restart_at {
            None => true,
            Some(t) => {
                t.elapsed() >= Duration::from_secs(self.config.registration_recovery_cooldown_secs)
            }
        }
    }

    /// One monitoring tick: poll per-worker health, then check RQ cluster
    /// registration and restart if it's under-provisioned and the cooldown
    /// has elapsed.
    async fn tick(&mut self) -> Result<()> {
        self.manager.check_health().await;

        let registered = self.registered_rq_worker_count().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to query registered RQ worker count");
            self.config.min_rq_workers
        });

        if registered < self.config.min_rq_workers && self.cooldown_elapsed() {
            tracing::warn!(
                registered,
                min_rq_workers = self.config.min_rq_workers,
                "registered RQ worker count below minimum, restarting RQ workers"
            );
            let restarted = self
                .manager
                .restart_all_rq_workers(Duration::from_secs(self.config.shutdown_timeout_secs))
                .await?;
            tracing::info!(restarted, "bulk RQ worker restart complete");
            self.last_restart_at = Some(Instant::now());
        }

        Ok(())
    }

    /// Run the monitor loop until `shutdown` is triggered. Waits out the
    /// startup grace period before the first health check so workers have
    /// time to register.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(self.config.startup_grace_period_secs)) => {}
            _ = shutdown.cancelled() => return,
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "health monitor tick failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }
}
