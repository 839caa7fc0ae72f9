//! Multi-queue job worker (the six `rq-worker-N` processes of §4.7),
//! grounded on the teacher's periodic-task idiom in `gateway/src/main.rs`
//! (an interval loop spawned per subsystem) but polling the in-process
//! job queue instead of a timer-only tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::app::Application;
use crate::handlers::HandlerRegistry;

/// How often `claim_next`'s poll loop also sweeps for expired job records
/// (§8: "after `result_ttl`, J is purgeable"). Piggybacks on the existing
/// loop rather than a separate timer task.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Poll `queues` round-robin, claiming and executing one job at a time.
/// Sleeps briefly when nothing is queued rather than busy-spinning.
pub async fn run(app: Arc<Application>, queues: Vec<String>, shutdown: CancellationToken) {
    let handlers = HandlerRegistry::standard();
    let mut last_purge = Instant::now();
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let mut claimed_any = false;
        for queue in &queues {
            let claimed = match app.queue.claim_next(queue).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(queue = %queue, error = %e, "failed to claim next job");
                    None
                }
            };
            let Some(job) = claimed else {
                continue;
            };
            claimed_any = true;
            execute(&app, &handlers, job).await;
        }

        if last_purge.elapsed() >= PURGE_INTERVAL {
            last_purge = Instant::now();
            if let Err(e) = app.queue.purge_expired().await {
                tracing::warn!(error = %e, "failed to purge expired jobs");
            }
        }

        if !claimed_any {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

async fn execute(app: &Arc<Application>, handlers: &HandlerRegistry, job: chronicle_domain::Job) {
    let Some(handler) = handlers.get(job.role) else {
        tracing::error!(job_id = %job.id, role = ?job.role, "no handler registered for role");
        let _ = app.queue.mark_failed(&job.id, "no handler registered").await;
        return;
    };

    let result = tokio::time::timeout(
        Duration::from_secs(job.timeout_secs),
        handler.handle(app, &job),
    )
    .await;

    let outcome = match result {
        Ok(Ok(value)) => {
            tracing::info!(job_id = %job.id, role = ?job.role, "job finished");
            app.queue.mark_finished(&job.id, Some(value)).await
        }
        Ok(Err(e)) => {
            tracing::error!(job_id = %job.id, role = ?job.role, error = %e, "job failed");
            app.queue.mark_failed(&job.id, e.to_string()).await
        }
        Err(_) => {
            tracing::error!(job_id = %job.id, role = ?job.role, "job timed out");
            app.queue.mark_failed(&job.id, "timed out").await
        }
    };
    if let Err(e) = outcome {
        tracing::error!(job_id = %job.id, error = %e, "failed to persist job outcome");
    }
}
