use serde::{Deserialize, Serialize};

/// Access levels a plugin may request (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Transcript,
    Conversation,
    Memory,
    Button,
}

/// Trigger condition gating whether a dispatched event reaches a plugin's
/// handler (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginCondition {
    Always,
    WakeWord {
        word: String,
        #[serde(default = "d_true")]
        strip_prefix: bool,
    },
    Regex(String),
}

fn d_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub id: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub access_levels: Vec<AccessLevel>,
    #[serde(default)]
    pub subscribed_events: Vec<String>,
    #[serde(default = "d_condition")]
    pub condition: PluginCondition,
}

fn d_condition() -> PluginCondition {
    PluginCondition::Always
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginsConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Capacity of the in-memory recent-dispatch log (§4.6).
    #[serde(default = "d_recent_log_capacity")]
    pub recent_event_log_capacity: usize,
}

fn d_recent_log_capacity() -> usize {
    200
}
