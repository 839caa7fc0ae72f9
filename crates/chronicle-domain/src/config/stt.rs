use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry in the STT provider registry (§6 "STT provider (WebSocket)").
///
/// A provider may be HTTP-batch (`streaming = false`) or WebSocket-streaming
/// (`streaming = true`); each advertises a `capabilities` set that may
/// include `"diarization"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttProviderConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Query parameters appended to the connection URL, before session
    /// substitution (`{sample_rate}`, `{diarize}`, ...).
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    /// Optional JSON template for the start-of-stream control message.
    pub start_message_template: Option<serde_json::Value>,
    /// Optional JSON template sent to cleanly end the stream.
    #[serde(default = "d_end_message")]
    pub end_message: serde_json::Value,
    pub expect_interim_type: Option<String>,
    pub expect_final_type: Option<String>,
    /// Dotted-path selectors into provider frames, e.g. "data.channel.alternatives.0.transcript".
    #[serde(default)]
    pub extract_text_path: Option<String>,
    #[serde(default)]
    pub extract_words_path: Option<String>,
    #[serde(default)]
    pub extract_segments_path: Option<String>,
}

impl SttProviderConfig {
    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.iter().any(|c| c == cap)
    }
}

fn d_end_message() -> serde_json::Value {
    serde_json::json!({ "type": "stop" })
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SttConfig {
    #[serde(default)]
    pub providers: Vec<SttProviderConfig>,
    /// Which provider id is used for streaming sessions.
    pub default_stream_provider: Option<String>,
    /// Discovery-loop cadence for `audio:stream:*` (§4.5), in milliseconds.
    #[serde(default = "d_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
}

fn d_discovery_interval_ms() -> u64 {
    1_000
}
