use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::config::{AccessLevel, PluginCondition};

/// Event taxonomy (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    TranscriptStreaming,
    MemoryProcessed,
    ConversationComplete,
    ButtonSinglePress,
    ButtonDoublePress,
    PluginAction,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::TranscriptStreaming => "transcript.streaming",
            EventName::MemoryProcessed => "memory.processed",
            EventName::ConversationComplete => "conversation.complete",
            EventName::ButtonSinglePress => "button.single_press",
            EventName::ButtonDoublePress => "button.double_press",
            EventName::PluginAction => "plugin.action",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    pub event_name: String,
    pub user_id: String,
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginContext {
    pub event: String,
    pub user_id: String,
    pub access_level: AccessLevel,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResult {
    pub plugin_id: String,
    pub success: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "d_true")]
    pub should_continue: bool,
}

fn d_true() -> bool {
    true
}
