//! Redis key-naming helpers for the audio session plane (§4.4). Centralized
//! so producer, persistence job, and reaper never drift on a prefix.

pub fn stream_key(client_id: &str) -> String {
    format!("audio:stream:{client_id}")
}

pub fn stream_pattern() -> &'static str {
    "audio:stream:*"
}

pub fn session_key(session_id: &str) -> String {
    format!("audio:session:{session_id}")
}

pub fn current_conversation_key(session_id: &str) -> String {
    format!("conversation:current:{session_id}")
}

/// File-path pointer for a conversation's persisted audio, 86400s TTL
/// (§4.4's key-namespace listing). Written by the persistence job on
/// rotation/close, read by batch reprocessing to locate the source audio.
pub fn audio_file_key(conversation_id: &str) -> String {
    format!("audio:file:{conversation_id}")
}

/// Fast-lookup job id for a streaming session's speech-detection job,
/// 86400s TTL. The audio-persistence job polls for this key's existence to
/// detect a dead companion job (`TerminationReason::JobZombie`).
pub fn speech_detection_job_key(client_id: &str) -> String {
    format!("speech_detection_job:{client_id}")
}

pub const AUDIO_FILE_TTL_SECS: u64 = 86_400;
pub const PERSISTENCE_GROUP: &str = "audio_persistence";
pub const CLEANUP_CONSUMER: &str = "cleanup-worker";

/// Client session status values stored in `audio:session:{id}.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finalizing,
    Complete,
}
