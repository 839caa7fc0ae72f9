use clap::{Parser, Subcommand};

/// chronicle-orchestratord — supervises the worker cluster and serves the
/// cluster's admin/health HTTP surface.
#[derive(Debug, Parser)]
#[command(name = "chronicle-orchestratord", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the supervisor and admin HTTP server (default).
    Serve {
        /// Address to bind the admin HTTP surface to.
        #[arg(long, default_value = "127.0.0.1:9200")]
        bind: String,
    },
    /// Print version information.
    Version,
}
