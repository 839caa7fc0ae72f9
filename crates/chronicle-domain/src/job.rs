use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed enumeration of job roles (§9 "Dynamic function references in jobs
/// become typed job descriptors"). The queue stores a role + parameters,
/// never a runtime callable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRole {
    StreamSpeechDetection,
    AudioStreamingPersistence,
    TranscribeFullAudio,
    RecogniseSpeakers,
    ProcessMemory,
    GenerateTitleSummary,
    DispatchConversationCompleteEvent,
}

impl JobRole {
    /// Which standard queue a role is enqueued on.
    pub fn queue(self) -> &'static str {
        use crate::config::{AUDIO_QUEUE, DEFAULT_QUEUE, MEMORY_QUEUE, TRANSCRIPTION_QUEUE};
        match self {
            JobRole::StreamSpeechDetection
            | JobRole::TranscribeFullAudio
            | JobRole::RecogniseSpeakers => TRANSCRIPTION_QUEUE,
            JobRole::AudioStreamingPersistence => AUDIO_QUEUE,
            JobRole::ProcessMemory => MEMORY_QUEUE,
            JobRole::GenerateTitleSummary | JobRole::DispatchConversationCompleteEvent => {
                DEFAULT_QUEUE
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Deferred,
    Finished,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed | JobStatus::Canceled)
    }
}

/// A queue record (§3 Job). `args`/`meta` are untyped JSON the way the
/// original RQ job carried opaque `args`/`kwargs`; `meta.conversation_id`
/// and `meta.client_id` drive filtering and aggregation across stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub role: JobRole,
    pub queue: String,
    pub args: serde_json::Value,
    pub status: JobStatus,
    pub timeout_secs: u64,
    pub result_ttl_secs: u64,
    pub failure_ttl_secs: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub dependents: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub exc_info: Option<String>,
}

impl Job {
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }

    pub fn client_id(&self) -> Option<&str> {
        self.meta_str("client_id")
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.meta_str("conversation_id")
    }
}

/// Builder for a new job record, mirroring the keyword-argument-heavy
/// `queue.enqueue(...)` call sites in the original controller.
pub struct JobSpec {
    pub id: String,
    pub role: JobRole,
    pub args: serde_json::Value,
    pub timeout_secs: u64,
    pub result_ttl_secs: u64,
    pub failure_ttl_secs: u64,
    pub depends_on: Vec<String>,
    pub meta: BTreeMap<String, serde_json::Value>,
    pub description: Option<String>,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, role: JobRole, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            role,
            args,
            timeout_secs: 300,
            result_ttl_secs: 86_400,
            failure_ttl_secs: 86_400,
            depends_on: Vec::new(),
            meta: BTreeMap::new(),
            description: None,
        }
    }

    pub fn timeout_secs(mut self, v: u64) -> Self {
        self.timeout_secs = v;
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.depends_on = ids.into_iter().collect();
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn description(mut self, d: impl Into<String>) -> Self {
        self.description = Some(d.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_maps_to_expected_queue() {
        assert_eq!(JobRole::ProcessMemory.queue(), "memory");
        assert_eq!(JobRole::AudioStreamingPersistence.queue(), "audio");
        assert_eq!(JobRole::GenerateTitleSummary.queue(), "default");
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Deferred.is_terminal());
    }
}
