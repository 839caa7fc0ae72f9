use clap::{Parser, Subcommand};

/// chronicle-worker — executes job-queue, audio-persistence, and
/// streaming-transcription work against a bootstrapped [`crate::Application`].
#[derive(Debug, Parser)]
#[command(name = "chronicle-worker", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one of the `rq-worker-N` processes, polling the given queues in order.
    Rq {
        /// Queue names to poll, highest priority first.
        #[arg(required = true)]
        queues: Vec<String>,
    },
    /// Run the audio-persistence job for a single client stream.
    Audio {
        /// The client id whose `audio:stream:{client_id}` to consume.
        client_id: String,
    },
    /// Run the streaming-transcription discovery loop.
    Stream,
    /// Print version information.
    Version,
}
