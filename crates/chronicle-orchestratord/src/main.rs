use std::sync::Arc;

use chronicle_domain::config::{Config, ConfigSeverity};
use chronicle_orchestratord::cli::{Cli, Command};
use chronicle_orchestratord::{api, AppState};
use chronicle_supervisor::{build_worker_definitions, HealthMonitor, ManagedWorker, ProcessManager};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve { bind: "127.0.0.1:9200".into() }) {
        Command::Version => {
            println!("chronicle-orchestratord {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Serve { bind } => {
            init_tracing();
            run_server(bind).await
        }
    }
}

async fn run_server(bind: String) -> anyhow::Result<()> {
    tracing::info!("chronicle-orchestratord starting");

    let config = load_config()?;
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("config validation failed");
    }
    let config = Arc::new(config);
    tracing::info!("configuration loaded and validated");

    let client = redis::Client::open(config.redis.url.clone())?;
    let redis = client.get_connection_manager().await?;
    tracing::info!("connected to redis");

    let enabled = build_worker_definitions(&config.supervisor, config.stt.default_stream_provider.as_deref());
    let workers: Vec<ManagedWorker> = enabled.into_iter().cloned().map(ManagedWorker::new).collect();
    let manager = Arc::new(ProcessManager::new(workers));
    manager.start_all().await?;
    tracing::info!("worker cluster started");

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let monitor = HealthMonitor::new(manager.clone(), redis.clone(), config.supervisor.clone());
    let monitor_shutdown = shutdown.clone();
    tokio::spawn(async move { monitor.run(monitor_shutdown).await });
    tracing::info!("health monitor running");

    let state = AppState { config: config.clone(), manager: manager.clone(), redis };
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "admin HTTP surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    manager
        .stop_all(std::time::Duration::from_secs(config.supervisor.shutdown_timeout_secs))
        .await?;
    tracing::info!("chronicle-orchestratord stopped");
    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let mut config = Config::from_env();
    if let Ok(raw) = std::fs::read_to_string("config.yml") {
        if let Err(e) = config.merge_yaml(&raw) {
            tracing::warn!(error = %e, "failed to parse config.yml, ignoring");
        }
    }
    Ok(config)
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        }
    });
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    shutdown.cancelled().await;
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chronicle_orchestratord=debug")),
        )
        .json()
        .init();
}
