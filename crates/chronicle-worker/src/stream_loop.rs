//! Streaming ASR worker (§4.5): a discovery loop at 1 s cadence spawning
//! one per-stream task per newly observed `audio:stream:*` key, each task
//! draining its own group-read loop and forwarding audio into a
//! [`StreamSession`].

use std::sync::Arc;
use std::time::Duration;

use chronicle_asr::{
    group_words_into_segments, should_dispatch_transcript_event, ProviderMessage, SpeakerWindowBuffer,
    StreamRegistry, StreamSession,
};
use chronicle_domain::conversation::Word;
use chronicle_domain::config::AccessLevel;
use chronicle_domain::{Error, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::app::Application;

const STREAMING_GROUP: &str = "streaming-transcription";

pub async fn run(app: Arc<Application>, mut conn: ConnectionManager, shutdown: CancellationToken) {
    let Some(provider) = app
        .config
        .stt
        .default_stream_provider
        .as_deref()
        .and_then(|id| app.config.stt.providers.iter().find(|p| p.id == id))
        .cloned()
    else {
        tracing::warn!("no default streaming STT provider configured, stream worker idling");
        return;
    };

    let mut registry = StreamRegistry::new();
    let consumer_name = format!("streaming-worker-{}", std::process::id());

    let mut interval = tokio::time::interval(Duration::from_millis(app.config.stt.discovery_interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        let keys: Vec<String> = match scan_stream_keys(&mut conn).await {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(error = %e, "stream discovery scan failed");
                continue;
            }
        };

        let completed = already_complete_streams(&mut conn, &keys).await;
        let fresh = registry.newly_discovered(keys.iter().map(String::as_str), |stream| {
            completed.contains(stream)
        });

        for stream_key in fresh {
            let client_id = stream_key
                .trim_start_matches("audio:stream:")
                .to_string();
            let app = app.clone();
            let mut task_conn = conn.clone();
            let provider = provider.clone();
            let consumer_name = consumer_name.clone();
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = run_stream_task(
                    app,
                    &mut task_conn,
                    &stream_key,
                    &client_id,
                    provider,
                    &consumer_name,
                    shutdown,
                )
                .await
                {
                    tracing::error!(client_id, error = %e, "streaming task ended with error");
                }
            });
        }
    }
}

async fn scan_stream_keys(conn: &mut ConnectionManager) -> Result<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(chronicle_audio::keys::stream_pattern())
            .arg("COUNT")
            .arg(100)
            .query_async(conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        keys.extend(batch);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}

/// Which of `keys` already have a `transcription:complete:{client_id}`
/// marker set, so discovery skips respawning a task for them.
async fn already_complete_streams(conn: &mut ConnectionManager, keys: &[String]) -> std::collections::HashSet<String> {
    let mut completed = std::collections::HashSet::new();
    for key in keys {
        let client_id = key.trim_start_matches("audio:stream:");
        let exists: bool = conn
            .exists(format!("transcription:complete:{client_id}"))
            .await
            .unwrap_or(false);
        if exists {
            completed.insert(key.clone());
        }
    }
    completed
}

#[allow(clippy::too_many_arguments)]
async fn run_stream_task(
    app: Arc<Application>,
    conn: &mut ConnectionManager,
    stream_key: &str,
    client_id: &str,
    provider: chronicle_domain::config::SttProviderConfig,
    consumer_name: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let _: () = conn
        .xgroup_create_mkstream(stream_key, STREAMING_GROUP, "0")
        .await
        .or_else(|e| if e.to_string().contains("BUSYGROUP") { Ok(()) } else { Err(e) })
        .map_err(|e| Error::Redis(e.to_string()))?;

    let sample_rate: u32 = conn
        .hget(
            chronicle_audio::keys::session_key(client_id),
            "audio_format_rate",
        )
        .await
        .unwrap_or(16_000);

    let diarizes = provider.capabilities.iter().any(|c| c == "diarization");
    let session = StreamSession::new(provider, sample_rate);
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(32);
    let (out_tx, mut out_rx) = mpsc::channel::<ProviderMessage>(32);

    let session_shutdown = shutdown.child_token();
    let run_shutdown = session_shutdown.clone();
    let session_handle = tokio::spawn(async move { session.run(audio_rx, out_tx, run_shutdown).await });

    let opts = StreamReadOptions::default()
        .group(STREAMING_GROUP, consumer_name)
        .block(1000)
        .count(20);

    // Non-diarizing providers identify a speaker per accumulated window
    // instead of per-word (§4.5); the result applies to the next final
    // event, so it's shared with `handle_provider_message` behind a mutex.
    let window = (!diarizes).then(|| {
        Mutex::new(SpeakerWindowBuffer::new(
            sample_rate,
            app.config.speaker_recognition.identification_window_secs,
        ))
    });
    let identified_speaker: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = out_rx.recv() => {
                match result {
                    Some(message) => {
                        handle_provider_message(&app, client_id, diarizes, &identified_speaker, message).await
                    }
                    None => break,
                }
            }
            reply = conn.xread_options(&[stream_key], &[">"], &opts) => {
                let reply: StreamReadReply = match reply {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(client_id, error = %e, "streaming xread failed");
                        continue;
                    }
                };
                let mut saw_end_marker = false;
                for key in reply.keys {
                    for entry in key.ids {
                        if entry.map.contains_key("end_marker") {
                            saw_end_marker = true;
                        } else if let Some(redis::Value::BulkString(bytes)) = entry.map.get("audio_data") {
                            if let Some(window) = &window {
                                let ready = {
                                    let mut buf = window.lock().await;
                                    buf.push(&chronicle_audio::pcm::decode_i16le(bytes));
                                    buf.take_if_ready()
                                };
                                if let Some(samples) = ready {
                                    spawn_speaker_identification(
                                        app.clone(),
                                        client_id.to_string(),
                                        samples,
                                        sample_rate,
                                        identified_speaker.clone(),
                                    );
                                }
                            }
                            let _ = audio_tx.send(bytes.clone()).await;
                        }
                        let _: Result<(), _> = conn.xack(stream_key, STREAMING_GROUP, &[entry.id.clone()]).await;
                    }
                }
                if saw_end_marker {
                    session_shutdown.cancel();
                    break;
                }
            }
        }
    }

    session_shutdown.cancel();
    let _ = session_handle.await;

    let complete_key = format!("transcription:complete:{client_id}");
    let _: Result<(), _> = conn.set_ex(&complete_key, "1", 300).await;
    Ok(())
}

/// Posts an accumulated audio window to the speaker-recognition service's
/// in-memory WAV upload fallback (§6 `POST /diarize-and-identify`) off the
/// main task so a slow identification call never stalls audio forwarding.
fn spawn_speaker_identification(
    app: Arc<Application>,
    client_id: String,
    samples: Vec<i16>,
    sample_rate: u32,
    identified_speaker: Arc<Mutex<Option<String>>>,
) {
    tokio::spawn(async move {
        let cfg = &app.config.speaker_recognition;
        if !cfg.enabled || cfg.base_url.is_empty() {
            return;
        }
        let Ok(wav) = chronicle_audio::writer::encode_wav_bytes(&samples, sample_rate) else {
            return;
        };
        let duration_secs = samples.len() as f64 / sample_rate as f64;
        let timeout = Duration::from_secs_f64(cfg.request_timeout_secs(duration_secs));
        let url = format!("{}/diarize-and-identify", cfg.base_url.trim_end_matches('/'));
        let part = match reqwest::multipart::Part::bytes(wav).file_name("window.wav").mime_str("audio/wav") {
            Ok(p) => p,
            Err(_) => return,
        };
        let form = reqwest::multipart::Form::new()
            .text("client_id", client_id.clone())
            .part("audio", part);

        let response = app.http.post(&url).timeout(timeout).multipart(form).send().await;
        let Ok(response) = response else {
            return;
        };
        if !response.status().is_success() {
            return;
        }
        if let Ok(body) = response.json::<serde_json::Value>().await {
            if let Some(name) = body.get("speaker_name").and_then(|v| v.as_str()) {
                *identified_speaker.lock().await = Some(name.to_string());
            }
        }
    });
}

async fn handle_provider_message(
    app: &Arc<Application>,
    client_id: &str,
    diarizes: bool,
    identified_speaker: &Arc<Mutex<Option<String>>>,
    message: ProviderMessage,
) {
    let (text, words, is_final) = match message {
        ProviderMessage::Interim { text, words } => (text, words, false),
        ProviderMessage::Final { text, words } => (text, words, true),
    };

    let word_structs: Vec<Word> = words
        .iter()
        .filter_map(|w| serde_json::from_value(w.clone()).ok())
        .collect();
    let segments = (diarizes && !word_structs.is_empty())
        .then(|| group_words_into_segments(&word_structs))
        .unwrap_or_default();

    let payload = serde_json::json!({
        "text": text,
        "is_final": is_final,
        "words": words,
        "segments": segments,
    });
    let channel = format!("transcription:interim:{client_id}");
    let mut conn = app.redis.clone();
    let _: Result<(), _> = redis::AsyncCommands::publish(&mut conn, &channel, payload.to_string()).await;

    if !is_final {
        return;
    }

    let results_stream = format!("transcription:results:{client_id}");
    let _: Result<String, _> = redis::cmd("XADD")
        .arg(&results_stream)
        .arg("*")
        .arg("text")
        .arg(&text)
        .query_async(&mut conn)
        .await;

    let speaker_from_segments = segments.iter().rev().map(|s| s.speaker.as_str()).find(|s| *s != "Unknown");
    let identified = match speaker_from_segments {
        Some(name) => Some(name.to_string()),
        None => identified_speaker.lock().await.clone(),
    };

    let primary_speakers = primary_speakers_for_client(&mut conn, client_id).await;
    if should_dispatch_transcript_event(&primary_speakers, identified.as_deref()) {
        let mut data = serde_json::Map::new();
        data.insert("transcript".into(), serde_json::json!(text));
        if let Some(name) = &identified {
            data.insert("speaker_name".into(), serde_json::json!(name));
        }
        app.plugins
            .dispatch_event(
                "transcript.streaming",
                client_id,
                AccessLevel::Transcript,
                &text,
                data,
                serde_json::Map::new(),
            )
            .await;
    }
}

/// Resolves the client→user mapping, then the user's configured primary
/// speakers (§4.5 "Plugin gating"). Both lookups are best-effort: a
/// missing mapping or empty set means gating never suppresses dispatch.
async fn primary_speakers_for_client(conn: &mut ConnectionManager, client_id: &str) -> Vec<String> {
    let user_id: Option<String> = conn.get(format!("client:owner:{client_id}")).await.unwrap_or(None);
    let Some(user_id) = user_id else {
        return Vec::new();
    };
    conn.smembers(format!("user:primary_speakers:{user_id}")).await.unwrap_or_default()
}
