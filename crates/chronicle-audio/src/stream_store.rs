//! Stream-primitive abstraction behind [`crate::reaper::reap_stuck_streams`]
//! (SPEC_FULL.md's claimed `StreamStore` trait). `RedisStreamStore` carries
//! the exact XINFO/XPENDING/XCLAIM/XACK sequence `reaper.rs` used to call
//! directly; `MemoryStreamStore` is a fake driving the same reap logic in
//! tests without a live Redis connection.

use std::collections::HashMap;

use async_trait::async_trait;
use chronicle_domain::{Error, Result};
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, Value};

#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub name: String,
    pub pending: usize,
    pub idle_ms: i64,
}

#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn scan_stream_keys(&self, pattern: &str) -> Result<Vec<String>>;
    /// `(length, last_entry_timestamp_ms)`.
    async fn stream_info(&self, stream: &str) -> Result<(usize, Option<i64>)>;
    async fn groups(&self, stream: &str) -> Result<Vec<String>>;
    async fn consumers(&self, stream: &str, group: &str) -> Result<Vec<ConsumerInfo>>;
    async fn pending_ids(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<String>>;
    async fn claim(&self, stream: &str, group: &str, id: &str) -> Result<bool>;
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool>;
    async fn delete_consumer(&self, stream: &str, group: &str, consumer: &str) -> Result<()>;
    async fn delete_stream(&self, stream: &str) -> Result<()>;
}

pub struct RedisStreamStore {
    conn: MultiplexedConnection,
}

impl RedisStreamStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

const CLEANUP_CONSUMER: &str = crate::keys::CLEANUP_CONSUMER;

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn scan_stream_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::Redis(e.to_string()))?;
            out.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(out)
    }

    async fn stream_info(&self, stream: &str) -> Result<(usize, Option<i64>)> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(stream)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        let length = field_i64(&reply, "length").unwrap_or(0).max(0) as usize;
        let last_entry_ms = field_value(&reply, "last-entry").and_then(|entry| {
            let Value::Array(fields) = entry else {
                return None;
            };
            let id = String::from_redis_value(fields.first()?).ok()?;
            id.split('-').next()?.parse::<i64>().ok()
        });
        Ok((length, last_entry_ms))
    }

    async fn groups(&self, stream: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XINFO")
            .arg("GROUPS")
            .arg(stream)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        let Value::Array(groups) = reply else {
            return Ok(Vec::new());
        };
        Ok(groups.iter().filter_map(|g| field_str(g, "name")).collect())
    }

    async fn consumers(&self, stream: &str, group: &str) -> Result<Vec<ConsumerInfo>> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XINFO")
            .arg("CONSUMERS")
            .arg(stream)
            .arg(group)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        let Value::Array(consumers) = reply else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for consumer in consumers {
            let Some(name) = field_str(&consumer, "name") else {
                continue;
            };
            let pending = field_i64(&consumer, "pending").unwrap_or(0).max(0) as usize;
            let idle_ms = field_i64(&consumer, "idle").unwrap_or(0);
            out.push(ConsumerInfo { name, pending, idle_ms });
        }
        Ok(out)
    }

    async fn pending_ids(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(count)
            .arg(consumer)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(parse_pending_ids(reply))
    }

    async fn claim(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let claimed: std::result::Result<Value, _> = redis::cmd("XCLAIM")
            .arg(stream)
            .arg(group)
            .arg(CLEANUP_CONSUMER)
            .arg(0)
            .arg(id)
            .query_async(&mut conn)
            .await;
        Ok(claimed.is_ok())
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acked: std::result::Result<i64, _> = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await;
        Ok(acked.is_ok())
    }

    async fn delete_consumer(&self, stream: &str, group: &str, consumer: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: std::result::Result<(), _> = redis::cmd("XGROUP")
            .arg("DELCONSUMER")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .query_async(&mut conn)
            .await;
        Ok(())
    }

    async fn delete_stream(&self, stream: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(stream)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }
}

fn parse_pending_ids(value: Value) -> Vec<String> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    // XPENDING with a range returns a flat list of 4-tuples: id, consumer, idle, deliveries.
    let mut ids = Vec::new();
    for entry in entries {
        if let Value::Array(fields) = entry {
            if let Some(Value::BulkString(bytes)) = fields.first() {
                if let Ok(s) = String::from_utf8(bytes.clone()) {
                    ids.push(s);
                }
            }
        }
    }
    ids
}

fn field_value(reply: &Value, key: &str) -> Option<Value> {
    let Value::Array(entries) = reply else {
        return None;
    };
    let mut i = 0;
    while i + 1 < entries.len() {
        if let Ok(k) = String::from_redis_value(&entries[i]) {
            if k == key {
                return Some(entries[i + 1].clone());
            }
        }
        i += 2;
    }
    None
}

fn field_str(reply: &Value, key: &str) -> Option<String> {
    field_value(reply, key).and_then(|v| String::from_redis_value(&v).ok())
}

fn field_i64(reply: &Value, key: &str) -> Option<i64> {
    field_value(reply, key).and_then(|v| i64::from_redis_value(&v).ok())
}

/// In-memory fake. Each stream carries a fixed length/age plus, per
/// consumer group, a set of consumers with their own pending-id lists —
/// enough to drive `reap_one_stream`'s full branch coverage in tests.
#[derive(Default)]
pub struct MemoryStreamStore {
    streams: parking_lot::RwLock<HashMap<String, FakeStream>>,
}

#[derive(Default, Clone)]
struct FakeStream {
    length: usize,
    age_secs: i64,
    groups: HashMap<String, HashMap<String, FakeConsumer>>,
}

#[derive(Default, Clone)]
struct FakeConsumer {
    idle_ms: i64,
    pending_ids: Vec<String>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(&self, name: &str, length: usize, age_secs: i64) {
        self.streams.write().insert(
            name.to_string(),
            FakeStream { length, age_secs, groups: HashMap::new() },
        );
    }

    pub fn with_consumer(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        idle_ms: i64,
        pending_ids: Vec<String>,
    ) {
        let mut streams = self.streams.write();
        let entry = streams.entry(stream.to_string()).or_default();
        entry
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(consumer.to_string(), FakeConsumer { idle_ms, pending_ids });
    }

    pub fn contains(&self, stream: &str) -> bool {
        self.streams.read().contains_key(stream)
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn scan_stream_keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Ok(self.streams.read().keys().cloned().collect())
    }

    async fn stream_info(&self, stream: &str) -> Result<(usize, Option<i64>)> {
        let streams = self.streams.read();
        let Some(s) = streams.get(stream) else {
            return Ok((0, None));
        };
        let now = chrono::Utc::now().timestamp_millis();
        Ok((s.length, Some(now - s.age_secs * 1000)))
    }

    async fn groups(&self, stream: &str) -> Result<Vec<String>> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .map(|s| s.groups.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn consumers(&self, stream: &str, group: &str) -> Result<Vec<ConsumerInfo>> {
        let streams = self.streams.read();
        let Some(consumers) = streams.get(stream).and_then(|s| s.groups.get(group)) else {
            return Ok(Vec::new());
        };
        Ok(consumers
            .iter()
            .map(|(name, c)| ConsumerInfo {
                name: name.clone(),
                pending: c.pending_ids.len(),
                idle_ms: c.idle_ms,
            })
            .collect())
    }

    async fn pending_ids(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<String>> {
        let streams = self.streams.read();
        Ok(streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .and_then(|g| g.get(consumer))
            .map(|c| c.pending_ids.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn claim(&self, _stream: &str, _group: &str, _id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        let mut streams = self.streams.write();
        let Some(s) = streams.get_mut(stream) else {
            return Ok(false);
        };
        let Some(g) = s.groups.get_mut(group) else {
            return Ok(false);
        };
        for consumer in g.values_mut() {
            consumer.pending_ids.retain(|i| i != id);
        }
        Ok(true)
    }

    async fn delete_consumer(&self, stream: &str, group: &str, consumer: &str) -> Result<()> {
        if let Some(s) = self.streams.write().get_mut(stream) {
            if let Some(g) = s.groups.get_mut(group) {
                g.remove(consumer);
            }
        }
        Ok(())
    }

    async fn delete_stream(&self, stream: &str) -> Result<()> {
        self.streams.write().remove(stream);
        Ok(())
    }
}
