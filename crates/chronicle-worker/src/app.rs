//! Owned application handles for worker entry points (§9 design note:
//! "Global singletons ... become explicit owned handles on an Application
//! value"), grounded on `gateway/src/main.rs`'s `run_server` bootstrap.

use std::sync::Arc;

use chronicle_domain::{Config, ConversationStore};
use chronicle_plugins::PluginRouter;
use chronicle_queue::JobQueue;
use redis::aio::ConnectionManager;

use crate::conversation_store::RedisConversationStore;

/// Every subsystem handle a worker process needs, built once at startup
/// and shared via `Arc` — no global mutable state.
pub struct Application {
    pub config: Arc<Config>,
    pub queue: Arc<JobQueue>,
    pub redis: ConnectionManager,
    pub plugins: Arc<PluginRouter>,
    pub conversations: Arc<dyn ConversationStore>,
    pub http: reqwest::Client,
}

impl Application {
    pub async fn bootstrap() -> anyhow::Result<Self> {
        let mut config = Config::from_env();
        if let Ok(raw) = std::fs::read_to_string("config.yml") {
            if let Err(e) = config.merge_yaml(&raw) {
                tracing::warn!(error = %e, "failed to parse config.yml, ignoring");
            }
        }

        let issues = config.validate();
        for issue in &issues {
            match issue.severity {
                chronicle_domain::config::ConfigSeverity::Warning => {
                    tracing::warn!("config: {issue}")
                }
                chronicle_domain::config::ConfigSeverity::Error => {
                    tracing::error!("config: {issue}")
                }
            }
        }
        if issues
            .iter()
            .any(|i| i.severity == chronicle_domain::config::ConfigSeverity::Error)
        {
            anyhow::bail!("config validation failed");
        }

        let client = redis::Client::open(config.redis.url.clone())?;
        let redis = client.get_connection_manager().await?;
        tracing::info!(url = %config.redis.url, "redis connection ready");

        let queue = Arc::new(JobQueue::redis(redis.clone()));
        let plugins = Arc::new(PluginRouter::new(config.plugins.recent_event_log_capacity));
        let conversations: Arc<dyn ConversationStore> =
            Arc::new(RedisConversationStore::new(redis.clone()));

        Ok(Self {
            config: Arc::new(config),
            queue,
            redis,
            plugins,
            conversations,
            http: reqwest::Client::new(),
        })
    }
}
