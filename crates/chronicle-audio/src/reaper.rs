//! Stuck-consumer reaper (§4.4 supplemented feature, grounded on
//! `original_source/.../queue_controller.py::cleanup_stuck_stream_workers`).
//! Operates over [`StreamStore`] rather than a raw connection so it can run
//! against [`crate::stream_store::MemoryStreamStore`] in tests.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chronicle_domain::Result;

use crate::keys::stream_pattern;
use crate::stream_store::StreamStore;

const STREAM_STALE_SECS: i64 = 3_600;
const CONSUMER_IDLE_MS: i64 = 300_000;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StreamCleanupResult {
    pub message: String,
    pub cleaned: usize,
    pub deleted_consumers: usize,
    pub deleted_stream: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReapReport {
    pub total_cleaned: usize,
    pub total_deleted_consumers: usize,
    pub total_deleted_streams: usize,
    pub streams: HashMap<String, StreamCleanupResult>,
}

/// Sweep every `audio:stream:*` key, deleting stale streams and reclaiming
/// pending messages from dead consumers. Safe to call repeatedly; each pass
/// is independent (no cross-call state).
pub async fn reap_stuck_streams(store: &dyn StreamStore) -> Result<ReapReport> {
    let mut report = ReapReport::default();
    let keys = store.scan_stream_keys(stream_pattern()).await?;

    for stream_name in keys {
        match reap_one_stream(store, &stream_name).await {
            Ok(result) => {
                report.total_cleaned += result.cleaned;
                report.total_deleted_consumers += result.deleted_consumers;
                if result.deleted_stream {
                    report.total_deleted_streams += 1;
                }
                report.streams.insert(stream_name, result);
            }
            Err(e) => {
                tracing::warn!(stream = %stream_name, error = %e, "error reaping stream");
                report.streams.insert(
                    stream_name,
                    StreamCleanupResult {
                        message: format!("error: {e}"),
                        ..Default::default()
                    },
                );
            }
        }
    }

    Ok(report)
}

async fn reap_one_stream(store: &dyn StreamStore, stream_name: &str) -> Result<StreamCleanupResult> {
    let (length, last_entry_ms) = store.stream_info(stream_name).await?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    let age_secs = last_entry_ms.map(|ts| (now - ts) / 1000);

    let should_delete = length == 0 || age_secs.is_some_and(|age| age > STREAM_STALE_SECS);
    if should_delete {
        store.delete_stream(stream_name).await?;
        return Ok(StreamCleanupResult {
            message: format!(
                "deleted stale stream (age: {}s, length: {length})",
                age_secs.unwrap_or(0)
            ),
            deleted_stream: true,
            ..Default::default()
        });
    }

    let groups = store.groups(stream_name).await?;
    let Some(group_name) = groups.into_iter().next() else {
        return Ok(StreamCleanupResult {
            message: "no consumer groups found".into(),
            ..Default::default()
        });
    };

    let consumers = store.consumers(stream_name, &group_name).await?;
    let mut cleaned = 0usize;
    let mut deleted_consumers = 0usize;

    for consumer in consumers {
        if consumer.pending > 0 {
            cleaned +=
                claim_and_ack_pending(store, stream_name, &group_name, &consumer.name, consumer.pending)
                    .await?;
        }
        if consumer.idle_ms > CONSUMER_IDLE_MS && consumer.pending == 0 {
            store.delete_consumer(stream_name, &group_name, &consumer.name).await?;
            deleted_consumers += 1;
            tracing::info!(stream = %stream_name, consumer = %consumer.name, "deleted dead consumer");
        }
    }

    if cleaned == 0 && deleted_consumers == 0 {
        return Ok(StreamCleanupResult {
            message: "no pending messages or dead consumers".into(),
            ..Default::default()
        });
    }

    Ok(StreamCleanupResult {
        message: format!(
            "cleaned {cleaned} pending messages, deleted {deleted_consumers} dead consumers"
        ),
        cleaned,
        deleted_consumers,
        deleted_stream: false,
    })
}

async fn claim_and_ack_pending(
    store: &dyn StreamStore,
    stream_name: &str,
    group_name: &str,
    consumer_name: &str,
    pending: usize,
) -> Result<usize> {
    let ids = store.pending_ids(stream_name, group_name, consumer_name, pending).await?;

    let mut cleaned = 0;
    for id in ids {
        if !store.claim(stream_name, group_name, &id).await? {
            continue;
        }
        if store.ack(stream_name, group_name, &id).await? {
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_store::MemoryStreamStore;

    #[tokio::test]
    async fn deletes_stale_empty_stream() {
        let store = MemoryStreamStore::new();
        store.with_stream("audio:stream:a", 0, 0);
        let report = reap_stuck_streams(&store).await.unwrap();
        assert_eq!(report.total_deleted_streams, 1);
        assert!(!store.contains("audio:stream:a"));
    }

    #[tokio::test]
    async fn claims_and_acks_pending_from_idle_consumer() {
        let store = MemoryStreamStore::new();
        store.with_stream("audio:stream:b", 5, 10);
        store.with_consumer(
            "audio:stream:b",
            "audio_persistence",
            "dead-worker",
            400_000,
            vec!["1-0".into(), "2-0".into()],
        );
        let report = reap_stuck_streams(&store).await.unwrap();
        assert_eq!(report.total_cleaned, 2);
        assert_eq!(report.total_deleted_consumers, 1);
        assert_eq!(report.total_deleted_streams, 0);
    }

    #[tokio::test]
    async fn leaves_healthy_stream_untouched() {
        let store = MemoryStreamStore::new();
        store.with_stream("audio:stream:c", 5, 10);
        store.with_consumer("audio:stream:c", "audio_persistence", "alive-worker", 1_000, vec![]);
        let report = reap_stuck_streams(&store).await.unwrap();
        assert_eq!(report.total_cleaned, 0);
        assert_eq!(report.total_deleted_consumers, 0);
        assert!(store.contains("audio:stream:c"));
    }
}
