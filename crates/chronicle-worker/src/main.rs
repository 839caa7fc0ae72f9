use std::sync::Arc;

use clap::Parser;
use chronicle_worker::cli::{Cli, Command};
use chronicle_worker::{app::Application, audio_loop, rq_loop, stream_loop};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("chronicle-worker {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing();
    let app = Arc::new(Application::bootstrap().await?);
    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    match cli.command {
        Command::Rq { queues } => {
            tracing::info!(?queues, "starting rq worker");
            rq_loop::run(app, queues, shutdown).await;
        }
        Command::Audio { client_id } => {
            tracing::info!(client_id = %client_id, "starting audio persistence job");
            audio_loop::run_persistence_job(app.redis.clone(), &client_id, shutdown).await?;
        }
        Command::Stream => {
            tracing::info!("starting streaming transcription worker");
            stream_loop::run(app.clone(), app.redis.clone(), shutdown).await;
        }
        Command::Version => unreachable!("handled above"),
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chronicle_worker=debug")),
        )
        .json()
        .init();
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown.cancel();
        }
    });
}
