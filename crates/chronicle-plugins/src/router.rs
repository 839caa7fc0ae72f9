//! Dispatch contract (§4.6), grounded on `NodeClient::connect_and_run`'s
//! `catch_unwind`-per-handler isolation pattern generalized from "one tool
//! call" to "one plugin on one event".

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chronicle_domain::config::{AccessLevel, PluginConfig};
use chronicle_domain::{PluginContext, PluginEvent, PluginResult};
use futures_util::FutureExt;
use parking_lot::RwLock;

use crate::condition::evaluate;
use crate::handler::PluginHandler;

struct RegisteredPlugin {
    config: PluginConfig,
    handler: Arc<dyn PluginHandler>,
}

/// Bounded FIFO of recent dispatch records, kept for debugging (§4.6).
pub struct RecentEventLog {
    capacity: usize,
    entries: RwLock<VecDeque<(PluginEvent, Vec<PluginResult>)>>,
}

impl RecentEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn record(&self, event: PluginEvent, results: Vec<PluginResult>) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((event, results));
    }

    pub fn recent(&self) -> Vec<(PluginEvent, Vec<PluginResult>)> {
        self.entries.read().iter().cloned().collect()
    }
}

pub struct PluginRouter {
    plugins: Vec<RegisteredPlugin>,
    recent: RecentEventLog,
}

impl PluginRouter {
    pub fn new(recent_log_capacity: usize) -> Self {
        Self {
            plugins: Vec::new(),
            recent: RecentEventLog::new(recent_log_capacity),
        }
    }

    pub fn register(&mut self, config: PluginConfig, handler: Arc<dyn PluginHandler>) {
        self.plugins.push(RegisteredPlugin { config, handler });
    }

    pub fn recent_events(&self) -> Vec<(PluginEvent, Vec<PluginResult>)> {
        self.recent.recent()
    }

    /// Enumerate enabled plugins subscribed to `event_name`, evaluate each
    /// one's trigger condition against `trigger_input`, and invoke matching
    /// handlers. A plugin panic or handler error is caught and reported as
    /// `PluginResult{success: false}`, never failing the whole dispatch.
    pub async fn dispatch_event(
        &self,
        event_name: &str,
        user_id: &str,
        access_level: AccessLevel,
        trigger_input: &str,
        mut data: serde_json::Map<String, serde_json::Value>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Vec<PluginResult> {
        let mut results = Vec::new();

        for plugin in &self.plugins {
            if !plugin.config.enabled {
                continue;
            }
            if !plugin.config.subscribed_events.iter().any(|e| e == event_name) {
                continue;
            }
            if !plugin.config.access_levels.contains(&access_level) {
                continue;
            }

            let trigger = evaluate(&plugin.config.condition, trigger_input);
            if !trigger.matched {
                continue;
            }

            let mut plugin_data = data.clone();
            if let Some(command) = &trigger.command {
                plugin_data.insert("command".into(), serde_json::json!(command));
                plugin_data.insert(
                    "original_transcript".into(),
                    serde_json::json!(trigger_input),
                );
            }

            let ctx = PluginContext {
                event: event_name.to_string(),
                user_id: user_id.to_string(),
                access_level,
                data: plugin_data,
                metadata: metadata.clone(),
            };

            let handler = plugin.handler.clone();
            let plugin_id = plugin.config.id.clone();
            let call = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;

            let result = match call {
                Ok(result) => result,
                Err(_panic) => {
                    tracing::error!(plugin_id = %plugin_id, event = event_name, "plugin handler panicked");
                    PluginResult {
                        plugin_id: plugin_id.clone(),
                        success: false,
                        message: Some("plugin handler panicked".into()),
                        data: serde_json::Map::new(),
                        should_continue: true,
                    }
                }
            };
            results.push(result);
        }

        let event = PluginEvent {
            event_name: event_name.to_string(),
            user_id: user_id.to_string(),
            data: std::mem::take(&mut data),
            metadata,
            timestamp: chrono::Utc::now(),
        };
        self.recent.record(event, results.clone());

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::config::PluginCondition;

    struct EchoPlugin;

    #[async_trait::async_trait]
    impl PluginHandler for EchoPlugin {
        fn id(&self) -> &str {
            "echo"
        }
        async fn handle(&self, ctx: PluginContext) -> PluginResult {
            PluginResult {
                plugin_id: "echo".into(),
                success: true,
                message: None,
                data: ctx.data,
                should_continue: true,
            }
        }
    }

    struct PanicPlugin;

    #[async_trait::async_trait]
    impl PluginHandler for PanicPlugin {
        fn id(&self) -> &str {
            "boom"
        }
        async fn handle(&self, _ctx: PluginContext) -> PluginResult {
            panic!("boom");
        }
    }

    fn config(id: &str, condition: PluginCondition) -> PluginConfig {
        PluginConfig {
            id: id.to_string(),
            enabled: true,
            access_levels: vec![AccessLevel::Transcript],
            subscribed_events: vec!["transcript.streaming".to_string()],
            condition,
        }
    }

    #[tokio::test]
    async fn dispatches_to_matching_subscribed_plugin() {
        let mut router = PluginRouter::new(10);
        router.register(config("echo", PluginCondition::Always), Arc::new(EchoPlugin));
        let results = router
            .dispatch_event(
                "transcript.streaming",
                "user-1",
                AccessLevel::Transcript,
                "hello world",
                serde_json::Map::new(),
                serde_json::Map::new(),
            )
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }

    #[tokio::test]
    async fn panicking_plugin_reports_failure_without_stopping_dispatch() {
        let mut router = PluginRouter::new(10);
        router.register(config("boom", PluginCondition::Always), Arc::new(PanicPlugin));
        router.register(config("echo", PluginCondition::Always), Arc::new(EchoPlugin));
        let results = router
            .dispatch_event(
                "transcript.streaming",
                "user-1",
                AccessLevel::Transcript,
                "hello",
                serde_json::Map::new(),
                serde_json::Map::new(),
            )
            .await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn wake_word_populates_command_and_original_transcript() {
        let mut router = PluginRouter::new(10);
        router.register(
            config(
                "echo",
                PluginCondition::WakeWord {
                    word: "hey bot".into(),
                    strip_prefix: true,
                },
            ),
            Arc::new(EchoPlugin),
        );
        let results = router
            .dispatch_event(
                "transcript.streaming",
                "user-1",
                AccessLevel::Transcript,
                "hey bot turn on the lights",
                serde_json::Map::new(),
                serde_json::Map::new(),
            )
            .await;
        assert_eq!(results[0].data["command"], "turn on the lights");
    }

    #[tokio::test]
    async fn recent_event_log_records_dispatch() {
        let mut router = PluginRouter::new(1);
        router.register(config("echo", PluginCondition::Always), Arc::new(EchoPlugin));
        router
            .dispatch_event(
                "transcript.streaming",
                "user-1",
                AccessLevel::Transcript,
                "a",
                serde_json::Map::new(),
                serde_json::Map::new(),
            )
            .await;
        router
            .dispatch_event(
                "transcript.streaming",
                "user-1",
                AccessLevel::Transcript,
                "b",
                serde_json::Map::new(),
                serde_json::Map::new(),
            )
            .await;
        assert_eq!(router.recent_events().len(), 1);
    }
}
