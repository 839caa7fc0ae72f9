//! Audio persistence job (§4.4): one long-running job per client stream,
//! consuming `audio:stream:{client_id}` under the `audio_persistence`
//! group, writing 16 kHz mono 16-bit frames, and terminating per the
//! four conditions in §4.4 (end-marker drain, session completion, zombie
//! detection, 24 h ceiling).

use std::time::{Duration, Instant};

use chronicle_audio::pcm::{decode_i16le, value_as_bytes};
use chronicle_audio::{
    keys, EndMarkerDrain, PersistenceWriter, RotationAction, RotationTracker, SessionStatus,
    TerminationReason, MAX_JOB_DURATION_SECS,
};
use chronicle_domain::{Error, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

const CONSUMER_NAME: &str = "audio-persistence-worker";
const OUTPUT_DIR: &str = "data/audio";

/// How often (c) the job liveness check runs against
/// `speech_detection_job:{client_id}`. Piggybacks on the main poll loop
/// rather than a separate timer task (same idiom as `rq_loop`'s purge gate).
const ZOMBIE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Drain grace on `status=finalizing`/`complete` before closing (§4.4).
const FINALIZING_GRACE: Duration = Duration::from_millis(500);

/// The output file plus the conversation id it belongs to, so closing it
/// knows which `audio:file:{id}` key to register.
struct OpenOutput {
    writer: PersistenceWriter,
    conversation_id: String,
}

pub async fn run_persistence_job(
    mut conn: ConnectionManager,
    client_id: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let stream = keys::stream_key(client_id);
    let _: () = conn
        .xgroup_create_mkstream(&stream, keys::PERSISTENCE_GROUP, "0")
        .await
        .or_else(|e| {
            if e.to_string().contains("BUSYGROUP") {
                Ok(())
            } else {
                Err(e)
            }
        })
        .map_err(|e| Error::Redis(e.to_string()))?;

    std::fs::create_dir_all(OUTPUT_DIR).map_err(Error::Io)?;

    let mut rotation = RotationTracker::default();
    let mut drain = EndMarkerDrain::default();
    let mut output: Option<OpenOutput> = None;
    let started = Instant::now();
    let mut last_zombie_check = Instant::now();

    let reason = loop {
        if shutdown.is_cancelled() {
            break TerminationReason::EndMarkerDrained;
        }
        if started.elapsed() > Duration::from_secs(MAX_JOB_DURATION_SECS) {
            tracing::info!(client_id, "persistence job hit 24h ceiling, exiting gracefully");
            break TerminationReason::MaxDurationElapsed;
        }

        if last_zombie_check.elapsed() >= ZOMBIE_CHECK_INTERVAL {
            last_zombie_check = Instant::now();
            if is_zombie(&mut conn, client_id).await {
                tracing::warn!(client_id, "speech-detection companion job missing, treating as zombie");
                break TerminationReason::JobZombie;
            }
        }

        // session_id == client_id for streaming sessions (see glossary).
        let observed_conversation: Option<String> = conn
            .get(keys::current_conversation_key(client_id))
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;

        match rotation.observe(observed_conversation.as_deref()) {
            RotationAction::None => {}
            RotationAction::Open(conversation_id) => {
                output = open_output(client_id, &conversation_id);
            }
            RotationAction::Close => {
                close_output(output.take(), &mut conn).await;
            }
            RotationAction::CloseThenOpen { open, .. } => {
                close_output(output.take(), &mut conn).await;
                output = open_output(client_id, &open);
            }
        }

        let had_entries = read_and_drain(&mut conn, &stream, &mut output, &mut drain, 1000).await?;

        if drain.observe_read(had_entries) {
            tracing::info!(client_id, "end marker drained, persistence job exiting");
            break TerminationReason::EndMarkerDrained;
        }

        if matches!(
            session_status(&mut conn, client_id).await,
            Some(SessionStatus::Finalizing | SessionStatus::Complete)
        ) {
            tracing::info!(client_id, "session finalizing, performing final drain");
            tokio::time::sleep(FINALIZING_GRACE).await;
            let _ = read_and_drain(&mut conn, &stream, &mut output, &mut drain, 500).await;
            break TerminationReason::SessionComplete;
        }
    };

    tracing::info!(client_id, ?reason, "persistence job terminating");
    close_output(output.take(), &mut conn).await;
    Ok(())
}

async fn read_and_drain(
    conn: &mut ConnectionManager,
    stream: &str,
    output: &mut Option<OpenOutput>,
    drain: &mut EndMarkerDrain,
    block_ms: usize,
) -> Result<bool> {
    let opts = StreamReadOptions::default()
        .group(keys::PERSISTENCE_GROUP, CONSUMER_NAME)
        .block(block_ms)
        .count(50);
    let reply: StreamReadReply = conn
        .xread_options(&[stream], &[">"], &opts)
        .await
        .map_err(|e| Error::Redis(e.to_string()))?;

    let mut had_entries = false;
    for key in reply.keys {
        for entry in key.ids {
            had_entries = true;
            if entry.map.contains_key("end_marker") {
                drain.observe_end_marker();
            } else if let Some(samples) = entry
                .map
                .get("audio_data")
                .and_then(value_as_bytes)
                .map(|b| decode_i16le(&b))
            {
                if let Some(o) = output.as_mut() {
                    let _ = o.writer.write_samples(&samples);
                }
            }
            let _: Result<(), _> = conn.xack(stream, keys::PERSISTENCE_GROUP, &[entry.id.clone()]).await;
        }
    }
    Ok(had_entries)
}

/// Finalizes the output file (if any) and registers `audio:file:{id}`
/// (§6's key-namespace listing) so batch reprocessing can find it later.
async fn close_output(output: Option<OpenOutput>, conn: &mut ConnectionManager) {
    let Some(OpenOutput { writer, conversation_id }) = output else {
        return;
    };
    let path = writer.path().to_path_buf();
    if writer.finalize().is_ok() {
        let _: Result<(), _> = conn
            .set_ex(
                keys::audio_file_key(&conversation_id),
                path.to_string_lossy().to_string(),
                keys::AUDIO_FILE_TTL_SECS,
            )
            .await;
    }
}

async fn session_status(conn: &mut ConnectionManager, client_id: &str) -> Option<SessionStatus> {
    let raw: Option<String> = conn.hget(keys::session_key(client_id), "status").await.ok().flatten();
    match raw?.as_str() {
        "active" => Some(SessionStatus::Active),
        "finalizing" => Some(SessionStatus::Finalizing),
        "complete" => Some(SessionStatus::Complete),
        _ => None,
    }
}

/// Liveness check (c): the companion speech-detection job registers
/// `speech_detection_job:{client_id}` at session start with an 86400s TTL;
/// if it's gone before this session's own termination, the companion job
/// died and this one should stop too rather than run for 24h alone.
async fn is_zombie(conn: &mut ConnectionManager, client_id: &str) -> bool {
    let exists: bool = conn.exists(keys::speech_detection_job_key(client_id)).await.unwrap_or(true);
    !exists
}

fn open_output(client_id: &str, conversation_id: &str) -> Option<OpenOutput> {
    let filename = chronicle_audio::session::output_filename(
        chrono::Utc::now().timestamp(),
        client_id,
        conversation_id,
    );
    let path = std::path::Path::new(OUTPUT_DIR).join(filename);
    PersistenceWriter::create(path, 16_000)
        .ok()
        .map(|writer| OpenOutput { writer, conversation_id: conversation_id.to_string() })
}
