//! Resolves the configured worker list into the subset that should
//! actually start, grounded on `worker_registry.py`'s
//! `build_worker_definitions` / `should_start_deepgram_batch` /
//! `should_start_parakeet`. Workers are config-driven here rather than
//! hardcoded (§9 design note): a `WorkerConfig.requires_provider` is the
//! Rust equivalent of the Python module's `enabled_check` predicates.

use chronicle_domain::config::{SupervisorConfig, WorkerConfig};

/// Filter `cfg.workers` down to the ones that should actually start,
/// given which STT provider is configured as the default streaming
/// provider. A worker with no `requires_provider` is unconditional; one
/// that names a provider only starts if that provider is the configured
/// default.
pub fn build_worker_definitions<'a>(
    cfg: &'a SupervisorConfig,
    default_stream_provider: Option<&str>,
) -> Vec<&'a WorkerConfig> {
    let mut enabled = Vec::new();
    let mut disabled = Vec::new();

    for worker in &cfg.workers {
        let is_enabled = match &worker.requires_provider {
            None => true,
            Some(provider) => default_stream_provider == Some(provider.as_str()),
        };
        if is_enabled {
            enabled.push(worker);
        } else {
            disabled.push(worker.name.as_str());
        }
    }

    tracing::info!(
        total = cfg.workers.len(),
        enabled = enabled.len(),
        enabled_names = ?enabled.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
        "resolved worker definitions"
    );
    if !disabled.is_empty() {
        tracing::info!(disabled_names = ?disabled, "disabled workers (provider mismatch)");
    }

    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::config::WorkerType;

    fn worker(name: &str, requires_provider: Option<&str>) -> WorkerConfig {
        WorkerConfig {
            name: name.into(),
            command: vec!["true".into()],
            worker_type: WorkerType::StreamConsumer,
            queues: vec![],
            restart_on_failure: true,
            requires_provider: requires_provider.map(String::from),
        }
    }

    #[test]
    fn unconditional_workers_are_always_enabled() {
        let cfg = SupervisorConfig {
            workers: vec![worker("audio-persistence", None)],
            ..Default::default()
        };
        let enabled = build_worker_definitions(&cfg, None);
        assert_eq!(enabled.len(), 1);
    }

    #[test]
    fn provider_scoped_worker_only_enabled_when_it_matches_default() {
        let cfg = SupervisorConfig {
            workers: vec![
                worker("deepgram-batch", Some("deepgram")),
                worker("parakeet-stream", Some("parakeet")),
            ],
            ..Default::default()
        };

        let enabled = build_worker_definitions(&cfg, Some("deepgram"));
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "deepgram-batch");

        let enabled = build_worker_definitions(&cfg, None);
        assert!(enabled.is_empty());
    }
}
