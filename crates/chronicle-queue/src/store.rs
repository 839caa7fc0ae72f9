use std::sync::Arc;

use chrono::Utc;
use chronicle_domain::job::{Job, JobSpec, JobStatus};
use chronicle_domain::Result;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;

use crate::queue_store::{MemoryQueueStore, QueueStore, RedisQueueStore};

/// Emitted whenever a job transitions status, mirroring the task-event
/// broadcast idiom used for SSE streaming elsewhere in this codebase. This
/// stays process-local (a `tokio::sync::broadcast`, not a coordination
/// channel) — its only consumers are in-process observability, unlike the
/// job records themselves, which must be visible across processes.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job-queue primitive (C1): dependency resolution, promotion, and
/// cascade-cancel logic layered over a [`QueueStore`]. Every worker
/// process (`rq-worker-N`, the audio-persistence job, the streaming
/// consumer) constructs its own `JobQueue`, but they all share state
/// through the same Redis-backed store — processes never share mutable
/// memory (§5), they share the key-value store.
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    events: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    pub fn redis(conn: ConnectionManager) -> Self {
        Self::with_store(Arc::new(RedisQueueStore::new(conn)))
    }

    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryQueueStore::new()))
    }

    pub fn with_store(store: Arc<dyn QueueStore>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self { store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    fn emit(&self, job_id: &str, status: JobStatus) {
        let _ = self.events.send(JobEvent {
            job_id: job_id.to_string(),
            status,
        });
    }

    /// Register a fast-lookup string key outside the job hash itself (e.g.
    /// `speech_detection_job:{client_id}`, §4.2/§4.4's zombie-detection
    /// signal).
    pub async fn register_fast_lookup(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.store.set_with_ttl(key, value, ttl_secs).await
    }

    pub async fn fast_lookup(&self, key: &str) -> Result<Option<String>> {
        self.store.get_string(key).await
    }

    /// Enqueue a job. If `job_id` already names an existing, non-terminal
    /// (or still-within-TTL terminal) record, that record is returned
    /// unchanged — this is the idempotent re-enqueue contract (§4.1).
    pub async fn enqueue(&self, spec: JobSpec, queue: &str) -> Result<Job> {
        if let Some(existing) = self.store.get_job(&spec.id).await? {
            tracing::info!(job_id = %spec.id, "re-enqueue attached to existing record");
            return Ok(existing);
        }

        let mut deps = Vec::with_capacity(spec.depends_on.len());
        for dep in &spec.depends_on {
            deps.push(self.store.get_job(dep).await?);
        }
        let all_deps_finished = deps
            .iter()
            .all(|d| d.as_ref().map(|j| j.status == JobStatus::Finished).unwrap_or(false));
        let any_dep_terminal_failure = deps.iter().any(|d| {
            d.as_ref()
                .map(|j| matches!(j.status, JobStatus::Failed | JobStatus::Canceled))
                .unwrap_or(false)
        });

        let status = if any_dep_terminal_failure {
            JobStatus::Canceled
        } else if spec.depends_on.is_empty() || all_deps_finished {
            JobStatus::Queued
        } else {
            JobStatus::Deferred
        };

        let job = Job {
            id: spec.id.clone(),
            role: spec.role,
            queue: queue.to_string(),
            args: spec.args,
            status,
            timeout_secs: spec.timeout_secs,
            result_ttl_secs: spec.result_ttl_secs,
            failure_ttl_secs: spec.failure_ttl_secs,
            depends_on: spec.depends_on.clone(),
            dependents: Vec::new(),
            meta: spec.meta,
            description: spec.description,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            result: None,
            exc_info: None,
        };

        for dep in &spec.depends_on {
            if let Some(mut dep_job) = self.store.get_job(dep).await? {
                dep_job.dependents.push(job.id.clone());
                self.store.put_job(&dep_job).await?;
            }
        }
        self.store.put_job(&job).await?;
        if job.status == JobStatus::Queued {
            self.store.push_queued(queue, &job.id, job.created_at.timestamp_millis()).await?;
        }

        tracing::info!(job_id = %job.id, queue = %queue, status = ?job.status, "enqueued");
        self.emit(&job.id, job.status);
        Ok(job)
    }

    pub async fn fetch(&self, job_id: &str) -> Result<Option<Job>> {
        self.store.get_job(job_id).await
    }

    /// Claim the oldest `Queued` job on `queue` for processing, atomically
    /// transitioning it to `Started`. Backed by Redis `ZPOPMIN`, so this is
    /// the real cross-process claim RQ's `dequeue_job_and_maintain_ttl`
    /// performs — two `rq-worker-N` processes polling the same queue can
    /// never both claim the same job.
    pub async fn claim_next(&self, queue: &str) -> Result<Option<Job>> {
        let Some(id) = self.store.pop_queued(queue).await? else {
            return Ok(None);
        };
        let Some(mut job) = self.store.get_job(&id).await? else {
            return Ok(None);
        };
        job.status = JobStatus::Started;
        job.started_at = Some(Utc::now());
        self.store.put_job(&job).await?;
        self.emit(&id, JobStatus::Started);
        Ok(Some(job))
    }

    pub async fn mark_started(&self, job_id: &str) -> Result<()> {
        if let Some(mut job) = self.store.get_job(job_id).await? {
            job.status = JobStatus::Started;
            job.started_at = Some(Utc::now());
            self.store.put_job(&job).await?;
        }
        self.emit(job_id, JobStatus::Started);
        Ok(())
    }

    /// Mark a job finished and promote any dependents whose full
    /// dependency set has now resolved.
    pub async fn mark_finished(&self, job_id: &str, result: Option<serde_json::Value>) -> Result<()> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(());
        };
        job.status = JobStatus::Finished;
        job.ended_at = Some(Utc::now());
        job.result = result;
        let dependents = job.dependents.clone();
        self.store.put_job(&job).await?;
        self.emit(job_id, JobStatus::Finished);
        self.promote_ready(&dependents).await
    }

    /// Mark a job failed and cascade-cancel every dependent (§4.1, §8 Queue
    /// semantics: "if any Di is failed/canceled, J becomes canceled").
    pub async fn mark_failed(&self, job_id: &str, exc_info: impl Into<String>) -> Result<()> {
        let Some(mut job) = self.store.get_job(job_id).await? else {
            return Ok(());
        };
        job.status = JobStatus::Failed;
        job.ended_at = Some(Utc::now());
        job.exc_info = Some(exc_info.into());
        let dependents = job.dependents.clone();
        self.store.put_job(&job).await?;
        self.emit(job_id, JobStatus::Failed);
        self.cancel_cascade(&dependents).await
    }

    async fn promote_ready(&self, candidate_ids: &[String]) -> Result<()> {
        for id in candidate_ids {
            let Some(mut job) = self.store.get_job(id).await? else {
                continue;
            };
            if job.status != JobStatus::Deferred {
                continue;
            }
            let mut ready = true;
            for dep in &job.depends_on {
                let finished = self
                    .store
                    .get_job(dep)
                    .await?
                    .map(|d| d.status == JobStatus::Finished)
                    .unwrap_or(false);
                if !finished {
                    ready = false;
                    break;
                }
            }
            if ready {
                job.status = JobStatus::Queued;
                let queue = job.queue.clone();
                let created = job.created_at.timestamp_millis();
                self.store.put_job(&job).await?;
                self.store.push_queued(&queue, id, created).await?;
                tracing::info!(job_id = %id, "promoted deferred -> queued");
                self.emit(id, JobStatus::Queued);
            }
        }
        Ok(())
    }

    fn cancel_cascade<'a>(
        &'a self,
        ids: &'a [String],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut stack = ids.to_vec();
            while let Some(id) = stack.pop() {
                let Some(mut job) = self.store.get_job(&id).await? else {
                    continue;
                };
                if job.status.is_terminal() {
                    continue;
                }
                job.status = JobStatus::Canceled;
                job.ended_at = Some(Utc::now());
                let dependents = job.dependents.clone();
                self.store.put_job(&job).await?;
                tracing::warn!(job_id = %id, "canceled (upstream dependency failed)");
                self.emit(&id, JobStatus::Canceled);
                stack.extend(dependents);
            }
            Ok(())
        })
    }

    /// Deduped, time-sorted, paginated view across all registries (§4.1).
    pub async fn get_jobs(
        &self,
        queue: Option<&str>,
        role_filter: Option<chronicle_domain::job::JobRole>,
        client_id_filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Job>, usize)> {
        let mut matched: Vec<Job> = self
            .store
            .all_jobs()
            .await?
            .into_iter()
            .filter(|j| queue.map(|q| j.queue == q).unwrap_or(true))
            .filter(|j| role_filter.map(|r| j.role == r).unwrap_or(true))
            .filter(|j| {
                client_id_filter
                    .map(|cid| j.client_id().map(|c| c.contains(cid)).unwrap_or(false))
                    .unwrap_or(true)
            })
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len();
        let page = matched.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    /// Recursively checks whether every job tagged with `client_id`, plus
    /// every one of their dependents, is in a terminal state (§4.1).
    pub async fn all_jobs_complete_for_client(&self, client_id: &str) -> Result<bool> {
        let jobs = self.store.all_jobs().await?;
        let by_id: std::collections::HashMap<&str, &Job> =
            jobs.iter().map(|j| (j.id.as_str(), j)).collect();
        let mut seen = std::collections::HashSet::new();

        fn is_complete<'a>(
            by_id: &std::collections::HashMap<&'a str, &'a Job>,
            id: &'a str,
            seen: &mut std::collections::HashSet<&'a str>,
        ) -> bool {
            if !seen.insert(id) {
                return true;
            }
            let Some(job) = by_id.get(id) else {
                return true;
            };
            if !job.status.is_terminal() {
                return false;
            }
            job.dependents.iter().all(|dep| is_complete(by_id, dep.as_str(), seen))
        }

        Ok(jobs
            .iter()
            .filter(|j| j.client_id() == Some(client_id))
            .all(|j| is_complete(&by_id, &j.id, &mut seen)))
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let jobs = self.store.all_jobs().await?;
        let mut stats = QueueStats::default();
        for job in &jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Started => stats.processing += 1,
                JobStatus::Finished => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Canceled => stats.cancelled += 1,
                JobStatus::Deferred => stats.deferred += 1,
            }
        }
        Ok(stats)
    }

    /// Per-queue breakdown used by the admin health surface (SPEC_FULL.md
    /// "SUPPLEMENTED FEATURES": `get_queue_health`).
    pub async fn per_queue_counts(&self) -> Result<std::collections::HashMap<String, PerQueueCounts>> {
        let jobs = self.store.all_jobs().await?;
        let mut out: std::collections::HashMap<String, PerQueueCounts> = std::collections::HashMap::new();
        for job in &jobs {
            let entry = out.entry(job.queue.clone()).or_default();
            match job.status {
                JobStatus::Queued | JobStatus::Deferred => entry.count += 1,
                JobStatus::Started => entry.started_count += 1,
                JobStatus::Finished => entry.finished_count += 1,
                JobStatus::Failed => entry.failed_count += 1,
                JobStatus::Canceled => {}
            }
        }
        Ok(out)
    }

    /// Purge terminal jobs past their `result_ttl`/`failure_ttl` (§8: "for
    /// all J, after `result_ttl`, J is purgeable"). Returns the number of
    /// records purged. Safe to call repeatedly; only touches jobs whose
    /// window has actually elapsed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let jobs = self.store.all_jobs().await?;
        let now = Utc::now();
        let mut purged = 0;
        for job in jobs {
            let Some(ended_at) = job.ended_at else { continue };
            if !job.status.is_terminal() {
                continue;
            }
            let ttl_secs = if job.status == JobStatus::Failed {
                job.failure_ttl_secs
            } else {
                job.result_ttl_secs
            };
            let expires_at = ended_at + chrono::Duration::seconds(ttl_secs as i64);
            if now >= expires_at {
                self.store.delete_job(&job.id).await?;
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(count = purged, "purged expired job records");
        }
        Ok(purged)
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub deferred: usize,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PerQueueCounts {
    pub count: usize,
    pub failed_count: usize,
    pub finished_count: usize,
    pub started_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::job::JobRole;

    fn spec(id: &str) -> JobSpec {
        JobSpec::new(id, JobRole::ProcessMemory, serde_json::json!({}))
    }

    #[tokio::test]
    async fn enqueue_without_deps_is_immediately_queued() {
        let q = JobQueue::in_memory();
        let job = q.enqueue(spec("a"), "memory").await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn enqueue_with_unfinished_dep_is_deferred() {
        let q = JobQueue::in_memory();
        q.enqueue(spec("a"), "memory").await.unwrap();
        let dependent = q
            .enqueue(spec("b").depends_on(["a".to_string()]), "memory")
            .await
            .unwrap();
        assert_eq!(dependent.status, JobStatus::Deferred);
    }

    #[tokio::test]
    async fn finishing_dependency_promotes_dependent_to_queued() {
        let q = JobQueue::in_memory();
        q.enqueue(spec("a"), "memory").await.unwrap();
        q.enqueue(spec("b").depends_on(["a".to_string()]), "memory").await.unwrap();
        q.mark_finished("a", None).await.unwrap();
        let b = q.fetch("b").await.unwrap().unwrap();
        assert_eq!(b.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn failing_dependency_cancels_dependents_transitively() {
        let q = JobQueue::in_memory();
        q.enqueue(spec("a"), "memory").await.unwrap();
        q.enqueue(spec("b").depends_on(["a".to_string()]), "memory").await.unwrap();
        q.enqueue(spec("c").depends_on(["b".to_string()]), "memory").await.unwrap();
        q.mark_failed("a", "boom").await.unwrap();
        assert_eq!(q.fetch("b").await.unwrap().unwrap().status, JobStatus::Canceled);
        assert_eq!(q.fetch("c").await.unwrap().unwrap().status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn reenqueue_with_same_id_attaches_to_existing_record() {
        let q = JobQueue::in_memory();
        let first = q.enqueue(spec("a"), "memory").await.unwrap();
        q.mark_started("a").await.unwrap();
        let second = q.enqueue(spec("a"), "memory").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, JobStatus::Started);
    }

    #[tokio::test]
    async fn get_jobs_has_no_duplicates_and_paginates() {
        let q = JobQueue::in_memory();
        for i in 0..5 {
            q.enqueue(spec(&format!("job-{i}")), "memory").await.unwrap();
        }
        let (page, total) = q.get_jobs(None, None, None, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        let ids: std::collections::HashSet<_> = page.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn claim_next_returns_oldest_queued_job_and_marks_it_started() {
        let q = JobQueue::in_memory();
        q.enqueue(spec("a"), "memory").await.unwrap();
        q.enqueue(spec("b"), "memory").await.unwrap();
        let claimed = q.claim_next("memory").await.unwrap().unwrap();
        assert_eq!(claimed.id, "a");
        assert_eq!(q.fetch("a").await.unwrap().unwrap().status, JobStatus::Started);
        let claimed = q.claim_next("memory").await.unwrap().unwrap();
        assert_eq!(claimed.id, "b");
        assert!(q.claim_next("memory").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_jobs_complete_for_client_respects_dependents() {
        let q = JobQueue::in_memory();
        q.enqueue(spec("a").meta("client_id", "c1"), "memory").await.unwrap();
        q.enqueue(
            spec("b").depends_on(["a".to_string()]).meta("client_id", "c1"),
            "memory",
        )
        .await
        .unwrap();
        assert!(!q.all_jobs_complete_for_client("c1").await.unwrap());
        q.mark_finished("a", None).await.unwrap();
        assert!(!q.all_jobs_complete_for_client("c1").await.unwrap());
        q.mark_finished("b", None).await.unwrap();
        assert!(q.all_jobs_complete_for_client("c1").await.unwrap());
    }

    #[tokio::test]
    async fn purge_expired_removes_only_jobs_past_their_ttl() {
        let q = JobQueue::in_memory();
        let job = q.enqueue(spec("a").timeout_secs(1), "memory").await.unwrap();
        let mut finished = job.clone();
        finished.status = JobStatus::Finished;
        finished.ended_at = Some(Utc::now() - chrono::Duration::seconds(100));
        finished.result_ttl_secs = 1;
        q.store.put_job(&finished).await.unwrap();

        let purged = q.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(q.fetch("a").await.unwrap().is_none());
    }
}
