//! Storage primitive behind [`crate::JobQueue`] (§3/§4.1: job records "live
//! in the key-value store's queue namespace"). `RedisQueueStore` is the
//! production backend every `rq-worker-N`/audio/stream-consumer OS process
//! shares; `MemoryQueueStore` is the `MemoryStore` test double.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chronicle_domain::job::Job;
use chronicle_domain::{Error, Result};
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Primitive get/put/queue operations a `JobQueue` is built from. Kept
/// narrow on purpose — dependency resolution, promotion, and cascade-cancel
/// stay in `JobQueue` as pure logic over these primitives.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;
    async fn put_job(&self, job: &Job) -> Result<()>;
    async fn delete_job(&self, job_id: &str) -> Result<()>;
    async fn all_jobs(&self) -> Result<Vec<Job>>;

    /// Add `job_id` to `queue`'s ready set, ordered by `score` (job
    /// creation time in millis).
    async fn push_queued(&self, queue: &str, job_id: &str, score: i64) -> Result<()>;
    /// Atomically pop the lowest-scored (oldest) member of `queue`'s ready
    /// set, if any.
    async fn pop_queued(&self, queue: &str) -> Result<Option<String>>;

    /// Side-channel string registry for fast-lookup keys outside the job
    /// hash itself (e.g. `speech_detection_job:{client_id}`, §4.2/§4.4).
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
}

/// Production backend: one `job:{id}` JSON string per job plus a
/// `queue:{queue}:queued` sorted set (scored by creation time) per named
/// queue, so `pop_queued` can use `ZPOPMIN` for a cross-process-atomic
/// claim — the primitive `claim_next` was missing entirely before.
pub struct RedisQueueStore {
    conn: ConnectionManager,
}

impl RedisQueueStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn job_key(job_id: &str) -> String {
        format!("job:{job_id}")
    }

    fn queue_key(queue: &str) -> String {
        format!("queue:{queue}:queued")
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::job_key(job_id))
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(Error::from))
            .transpose()
    }

    async fn put_job(&self, job: &Job) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(job)?;
        let _: () = conn
            .set(Self::job_key(&job.id), raw)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::job_key(job_id))
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn all_jobs(&self) -> Result<Vec<Job>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("job:*")
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::Redis(e.to_string()))?;
            ids.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        let mut jobs = Vec::with_capacity(ids.len());
        for key in ids {
            let raw: Option<String> = conn.get(&key).await.map_err(|e| Error::Redis(e.to_string()))?;
            if let Some(raw) = raw {
                jobs.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(jobs)
    }

    async fn push_queued(&self, queue: &str, job_id: &str, score: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(Self::queue_key(queue), job_id, score)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn pop_queued(&self, queue: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmin(Self::queue_key(queue), 1)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(popped.into_iter().next().map(|(id, _)| id))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| Error::Redis(e.to_string()))
    }
}

/// In-memory fake mirroring `RedisQueueStore`'s exact semantics (score-
/// ordered pop, independent queue sets), used by every test in this crate.
#[derive(Default)]
pub struct MemoryQueueStore {
    jobs: RwLock<HashMap<String, Job>>,
    queues: RwLock<HashMap<String, BTreeMap<i64, Vec<String>>>>,
    strings: RwLock<HashMap<String, String>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn put_job(&self, job: &Job) -> Result<()> {
        self.jobs.write().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.jobs.write().remove(job_id);
        Ok(())
    }

    async fn all_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.read().values().cloned().collect())
    }

    async fn push_queued(&self, queue: &str, job_id: &str, score: i64) -> Result<()> {
        self.queues
            .write()
            .entry(queue.to_string())
            .or_default()
            .entry(score)
            .or_default()
            .push(job_id.to_string());
        Ok(())
    }

    async fn pop_queued(&self, queue: &str) -> Result<Option<String>> {
        let mut queues = self.queues.write();
        let Some(set) = queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some((&score, ids)) = set.iter_mut().next() else {
            return Ok(None);
        };
        let id = ids.remove(0);
        if ids.is_empty() {
            set.remove(&score);
        }
        Ok(Some(id))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<()> {
        self.strings.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.strings.read().get(key).cloned())
    }
}
