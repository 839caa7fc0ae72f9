use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Reason a conversation ended (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserStopped,
    InactivityTimeout,
    WebsocketDisconnect,
    MaxDuration,
    CloseRequested,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryProvider {
    Chronicle,
    OpenmemoryMcp,
    /// Legacy value retained for documents written before the provider
    /// taxonomy settled.
    FriendLite,
}

/// Type of a transcript segment (speech, non-speech event, or a
/// user-inserted annotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Speech,
    Event,
    Note,
}

/// Individual word with timestamp in a transcript.
///
/// Some providers use `start_time`/`end_time` instead of `start`/`end`; the
/// aliases canonicalize on deserialize so downstream code never branches on
/// provider identity to read a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(alias = "start_time")]
    pub start: f64,
    #[serde(alias = "end_time")]
    pub end: f64,
    pub confidence: Option<f32>,
    pub speaker: Option<i32>,
    pub speaker_confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: String,
    #[serde(default = "d_segment_type")]
    pub segment_type: SegmentType,
    pub identified_as: Option<String>,
    pub confidence: Option<f32>,
    #[serde(default)]
    pub words: Vec<Word>,
}

fn d_segment_type() -> SegmentType {
    SegmentType::Speech
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptVersion {
    pub version_id: String,
    pub transcript: Option<String>,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default)]
    pub segments: Vec<SpeakerSegment>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_time_seconds: Option<f64>,
    pub diarization_source: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVersion {
    pub version_id: String,
    pub memory_count: usize,
    pub transcript_version_id: String,
    pub provider: MemoryProvider,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_time_seconds: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub client_id: String,

    pub external_source_id: Option<String>,
    pub external_source_type: Option<String>,

    pub audio_chunks_count: Option<u32>,
    pub audio_total_duration: Option<f64>,
    pub audio_compression_ratio: Option<f64>,

    #[serde(default)]
    pub markers: Vec<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub deleted: bool,
    pub deletion_reason: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub processing_status: Option<String>,
    #[serde(default)]
    pub always_persist: bool,

    pub end_reason: Option<EndReason>,
    pub completed_at: Option<DateTime<Utc>>,

    pub title: Option<String>,
    pub summary: Option<String>,
    pub detailed_summary: Option<String>,

    #[serde(default)]
    pub transcript_versions: Vec<TranscriptVersion>,
    #[serde(default)]
    pub memory_versions: Vec<MemoryVersion>,

    pub active_transcript_version: Option<String>,
    pub active_memory_version: Option<String>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            client_id: client_id.into(),
            external_source_id: None,
            external_source_type: None,
            audio_chunks_count: None,
            audio_total_duration: None,
            audio_compression_ratio: None,
            markers: Vec::new(),
            created_at: Utc::now(),
            deleted: false,
            deletion_reason: None,
            deleted_at: None,
            processing_status: None,
            always_persist: false,
            end_reason: None,
            completed_at: None,
            title: None,
            summary: None,
            detailed_summary: None,
            transcript_versions: Vec::new(),
            memory_versions: Vec::new(),
            active_transcript_version: None,
            active_memory_version: None,
        }
    }

    pub fn active_transcript(&self) -> Option<&TranscriptVersion> {
        let id = self.active_transcript_version.as_ref()?;
        self.transcript_versions.iter().find(|v| &v.version_id == id)
    }

    pub fn active_memory(&self) -> Option<&MemoryVersion> {
        let id = self.active_memory_version.as_ref()?;
        self.memory_versions.iter().find(|v| &v.version_id == id)
    }

    pub fn transcript(&self) -> Option<&str> {
        self.active_transcript()?.transcript.as_deref()
    }

    pub fn segments(&self) -> &[SpeakerSegment] {
        self.active_transcript().map(|t| t.segments.as_slice()).unwrap_or(&[])
    }

    pub fn segment_count(&self) -> usize {
        self.segments().len()
    }

    pub fn memory_count(&self) -> usize {
        self.active_memory().map(|m| m.memory_count).unwrap_or(0)
    }

    pub fn has_memory(&self) -> bool {
        !self.memory_versions.is_empty()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_transcript_version(
        &mut self,
        version_id: impl Into<String>,
        transcript: Option<String>,
        words: Vec<Word>,
        segments: Vec<SpeakerSegment>,
        provider: Option<String>,
        model: Option<String>,
        processing_time_seconds: Option<f64>,
        set_as_active: bool,
    ) -> &TranscriptVersion {
        let version_id = version_id.into();
        let version = TranscriptVersion {
            version_id: version_id.clone(),
            transcript,
            words,
            segments,
            provider,
            model,
            created_at: Utc::now(),
            processing_time_seconds,
            diarization_source: None,
            metadata: Default::default(),
        };
        self.transcript_versions.push(version);
        if set_as_active {
            self.active_transcript_version = Some(version_id);
        }
        self.transcript_versions.last().expect("just pushed")
    }

    pub fn add_memory_version(
        &mut self,
        version_id: impl Into<String>,
        memory_count: usize,
        transcript_version_id: impl Into<String>,
        provider: MemoryProvider,
        model: Option<String>,
        processing_time_seconds: Option<f64>,
        set_as_active: bool,
    ) -> &MemoryVersion {
        let version_id = version_id.into();
        let version = MemoryVersion {
            version_id: version_id.clone(),
            memory_count,
            transcript_version_id: transcript_version_id.into(),
            provider,
            model,
            created_at: Utc::now(),
            processing_time_seconds,
            metadata: Default::default(),
        };
        self.memory_versions.push(version);
        if set_as_active {
            self.active_memory_version = Some(version_id);
        }
        self.memory_versions.last().expect("just pushed")
    }

    /// Swap the active transcript pointer; fails if the version is absent
    /// (§6 `activate_transcript_version`).
    pub fn set_active_transcript_version(&mut self, version_id: &str) -> Result<()> {
        if !self.transcript_versions.iter().any(|v| v.version_id == version_id) {
            return Err(Error::NotFound {
                kind: "transcript_version",
                id: version_id.to_string(),
            });
        }
        self.active_transcript_version = Some(version_id.to_string());
        Ok(())
    }

    pub fn set_active_memory_version(&mut self, version_id: &str) -> Result<()> {
        if !self.memory_versions.iter().any(|v| v.version_id == version_id) {
            return Err(Error::NotFound {
                kind: "memory_version",
                id: version_id.to_string(),
            });
        }
        self.active_memory_version = Some(version_id.to_string());
        Ok(())
    }

    pub fn soft_delete(&mut self, reason: impl Into<String>) {
        self.deleted = true;
        self.deletion_reason = Some(reason.into());
        self.deleted_at = Some(Utc::now());
    }

    pub fn restore(&mut self) {
        self.deleted = false;
        self.deletion_reason = None;
        self.deleted_at = None;
    }

    /// Normalize legacy/malformed fields the way the original document
    /// adapter did before handing a loaded document to the rest of the
    /// pipeline (see SPEC_FULL.md "Legacy-data normalization"). Assumes the
    /// shape-level normalization in [`sanitize_legacy_raw`] already ran, so
    /// this only does the string-level touch-ups that survive typed
    /// deserialization either way.
    pub fn sanitize_legacy(&mut self) {
        for version in &mut self.transcript_versions {
            if let Some(provider) = &version.provider {
                version.provider = Some(provider.to_lowercase());
            }
            for segment in &mut version.segments {
                if segment.speaker.trim().is_empty() {
                    segment.speaker = "unknown".to_string();
                }
            }
        }
    }

    /// Parse a raw, possibly legacy-shaped document: run
    /// [`sanitize_legacy_raw`] over the untyped JSON before handing it to
    /// `serde`, since an integer `speaker` or non-array `segments` field
    /// would otherwise fail typed deserialization before `sanitize_legacy`
    /// ever got a chance to run. Called from the document-store
    /// deserialization boundary (`ConversationStore::load`), not from
    /// request handlers.
    pub fn from_legacy_json(raw: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        sanitize_legacy_raw(&mut value);
        let mut conversation: Conversation = serde_json::from_value(value)?;
        conversation.sanitize_legacy();
        Ok(conversation)
    }

    /// Invariant check used by tests and admin tooling (§8 invariants a–d).
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(id) = &self.active_transcript_version {
            if !self.transcript_versions.iter().any(|v| &v.version_id == id) {
                return Err(Error::Validation {
                    field: "active_transcript_version".into(),
                    message: format!("points to missing version {id}"),
                });
            }
        }
        if let Some(id) = &self.active_memory_version {
            let mem = self.memory_versions.iter().find(|v| &v.version_id == id);
            match mem {
                None => {
                    return Err(Error::Validation {
                        field: "active_memory_version".into(),
                        message: format!("points to missing version {id}"),
                    })
                }
                Some(m) => {
                    if !self
                        .transcript_versions
                        .iter()
                        .any(|v| v.version_id == m.transcript_version_id)
                    {
                        return Err(Error::Validation {
                            field: "active_memory_version".into(),
                            message: format!(
                                "memory version {id} references missing transcript version {}",
                                m.transcript_version_id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Coerce legacy document shapes into what typed deserialization expects,
/// operating on untyped JSON so malformed-but-legacy shapes don't reject
/// the whole document before they can be cleaned up (see
/// [`Conversation::from_legacy_json`]). Mirrors the original's
/// `clean_legacy_data`: integer speaker ids become `"Speaker N"` strings,
/// and non-list `segments`/non-string `transcript` fields are cleared
/// rather than rejected.
pub fn sanitize_legacy_raw(value: &mut serde_json::Value) {
    let Some(versions) = value
        .get_mut("transcript_versions")
        .and_then(|v| v.as_array_mut())
    else {
        return;
    };
    for version in versions {
        let Some(obj) = version.as_object_mut() else {
            continue;
        };
        if !matches!(obj.get("transcript"), None | Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null)) {
            obj.insert("transcript".into(), serde_json::Value::Null);
        }
        match obj.get_mut("segments") {
            Some(serde_json::Value::Array(segments)) => {
                for segment in segments {
                    normalize_legacy_speaker(segment);
                }
            }
            Some(_) => {
                obj.insert("segments".into(), serde_json::Value::Array(Vec::new()));
            }
            None => {}
        }
    }
}

fn normalize_legacy_speaker(segment: &mut serde_json::Value) {
    let Some(obj) = segment.as_object_mut() else {
        return;
    };
    match obj.get("speaker") {
        Some(serde_json::Value::Number(n)) => {
            let label = format!("Speaker {n}");
            obj.insert("speaker".into(), serde_json::Value::String(label));
        }
        Some(serde_json::Value::String(_)) => {}
        _ => {
            obj.insert("speaker".into(), serde_json::Value::String("unknown".into()));
        }
    }
}

/// Opus-encoded 10-second audio span (§3 AudioChunk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub conversation_id: String,
    pub chunk_index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u8,
    pub compressed_size: u64,
    pub original_size: u64,
    #[serde(default)]
    pub deleted: bool,
}

/// Maximum conversation audio duration for a single batch upload, in
/// seconds (30 minutes, §3/§8 round-trip property).
pub const MAX_BATCH_AUDIO_SECONDS: f64 = 1800.0;
pub const MAX_BATCH_AUDIO_CHUNKS: usize = 180;
pub const CHUNK_DURATION_SECONDS: f64 = 10.0;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conversation {
        Conversation::new("user-1", "client-1")
    }

    #[test]
    fn active_transcript_version_must_exist() {
        let mut c = sample();
        assert!(c.set_active_transcript_version("missing").is_err());
        c.add_transcript_version(
            "v1",
            Some("hello".into()),
            vec![],
            vec![],
            Some("streaming".into()),
            None,
            None,
            true,
        );
        assert!(c.check_invariants().is_ok());
        assert_eq!(c.transcript().unwrap(), "hello");
    }

    #[test]
    fn memory_version_must_reference_present_transcript() {
        let mut c = sample();
        c.add_transcript_version("v1", Some("hi".into()), vec![], vec![], None, None, None, true);
        c.add_memory_version("m1", 2, "v1", MemoryProvider::Chronicle, None, None, true);
        assert!(c.check_invariants().is_ok());
        assert_eq!(c.memory_count(), 2);

        c.memory_versions[0].transcript_version_id = "missing".into();
        assert!(c.check_invariants().is_err());
    }

    #[test]
    fn soft_delete_preserves_versions() {
        let mut c = sample();
        c.add_transcript_version("v1", Some("hi".into()), vec![], vec![], None, None, None, true);
        c.soft_delete("no_meaningful_speech");
        assert!(c.deleted);
        assert_eq!(c.transcript_versions.len(), 1);
        c.restore();
        assert!(!c.deleted);
    }

    #[test]
    fn word_deserializes_start_time_alias() {
        let json = r#"{"word":"hi","start_time":1.0,"end_time":1.5,"confidence":null,"speaker":null,"speaker_confidence":null}"#;
        let w: Word = serde_json::from_str(json).unwrap();
        assert_eq!(w.start, 1.0);
        assert_eq!(w.end, 1.5);
    }

    #[test]
    fn from_legacy_json_normalizes_integer_speaker_and_bad_segments_shape() {
        let mut c = sample();
        c.add_transcript_version("v1", Some("hi".into()), vec![], vec![], None, None, None, true);
        let mut raw = serde_json::to_value(&c).unwrap();
        raw["transcript_versions"][0]["segments"] = serde_json::json!([
            {"start": 0.0, "end": 1.0, "text": "hi", "speaker": 2, "segment_type": "speech", "identified_as": null, "confidence": null, "words": []}
        ]);
        raw["transcript_versions"][0]["provider"] = serde_json::json!("STREAMING");
        let raw = serde_json::to_string(&raw).unwrap();

        let loaded = Conversation::from_legacy_json(&raw).unwrap();
        assert_eq!(loaded.transcript_versions[0].segments[0].speaker, "Speaker 2");
        assert_eq!(loaded.transcript_versions[0].provider.as_deref(), Some("streaming"));
    }

    #[test]
    fn from_legacy_json_clears_non_list_segments_instead_of_failing() {
        let mut c = sample();
        c.add_transcript_version("v1", Some("hi".into()), vec![], vec![], None, None, None, true);
        let mut raw = serde_json::to_value(&c).unwrap();
        raw["transcript_versions"][0]["segments"] = serde_json::json!("not-a-list");
        raw["transcript_versions"][0]["transcript"] = serde_json::json!(42);
        let raw = serde_json::to_string(&raw).unwrap();

        let loaded = Conversation::from_legacy_json(&raw).unwrap();
        assert!(loaded.transcript_versions[0].segments.is_empty());
        assert!(loaded.transcript_versions[0].transcript.is_none());
    }
}
