use serde::{Deserialize, Serialize};

/// The four standard queue names (§4.1).
pub const TRANSCRIPTION_QUEUE: &str = "transcription";
pub const MEMORY_QUEUE: &str = "memory";
pub const AUDIO_QUEUE: &str = "audio";
pub const DEFAULT_QUEUE: &str = "default";

pub const QUEUE_NAMES: [&str; 4] =
    [DEFAULT_QUEUE, TRANSCRIPTION_QUEUE, MEMORY_QUEUE, AUDIO_QUEUE];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Job timeout for streaming session-level jobs (speech detection,
    /// audio persistence), in seconds. 24h to cover all-day sessions.
    #[serde(default = "d_streaming_job_timeout")]
    pub streaming_job_timeout_secs: u64,
    #[serde(default = "d_speaker_timeout")]
    pub speaker_recognition_timeout_secs: u64,
    #[serde(default = "d_memory_timeout")]
    pub memory_timeout_secs: u64,
    #[serde(default = "d_title_summary_timeout")]
    pub title_summary_timeout_secs: u64,
    #[serde(default = "d_event_dispatch_timeout")]
    pub event_dispatch_timeout_secs: u64,
    #[serde(default = "d_transcribe_timeout")]
    pub transcribe_timeout_secs: u64,
    /// Whether speaker recognition runs as part of the post-conversation DAG.
    #[serde(default = "d_true")]
    pub speaker_recognition_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            streaming_job_timeout_secs: d_streaming_job_timeout(),
            speaker_recognition_timeout_secs: d_speaker_timeout(),
            memory_timeout_secs: d_memory_timeout(),
            title_summary_timeout_secs: d_title_summary_timeout(),
            event_dispatch_timeout_secs: d_event_dispatch_timeout(),
            transcribe_timeout_secs: d_transcribe_timeout(),
            speaker_recognition_enabled: d_true(),
        }
    }
}

fn d_streaming_job_timeout() -> u64 {
    86_400
}
fn d_speaker_timeout() -> u64 {
    1_200
}
fn d_memory_timeout() -> u64 {
    900
}
fn d_title_summary_timeout() -> u64 {
    300
}
fn d_event_dispatch_timeout() -> u64 {
    120
}
fn d_transcribe_timeout() -> u64 {
    1_800
}
fn d_true() -> bool {
    true
}
