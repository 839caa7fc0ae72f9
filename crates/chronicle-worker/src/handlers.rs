//! Post-conversation job handlers (C5), dispatched by role per §9's
//! "typed job descriptors ... dispatch table that maps role → handler"
//! design note.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chronicle_domain::config::AccessLevel;
use chronicle_domain::job::{Job, JobRole};
use chronicle_domain::{Error, Result};
use serde_json::Value;

use crate::app::Application;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value>;
}

pub struct HandlerRegistry {
    handlers: HashMap<JobRole, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn standard() -> Self {
        let mut handlers: HashMap<JobRole, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(JobRole::RecogniseSpeakers, Arc::new(SpeakerRecognitionHandler));
        handlers.insert(JobRole::ProcessMemory, Arc::new(MemoryExtractionHandler));
        handlers.insert(JobRole::GenerateTitleSummary, Arc::new(TitleSummaryHandler));
        handlers.insert(
            JobRole::DispatchConversationCompleteEvent,
            Arc::new(EventDispatchHandler),
        );
        handlers.insert(JobRole::TranscribeFullAudio, Arc::new(BatchTranscriptionHandler));
        Self { handlers }
    }

    pub fn get(&self, role: JobRole) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&role).cloned()
    }
}

/// Calls the configured speaker-recognition service's match endpoint
/// (§6: `POST /v1/diarize-identify-match`), with the audio-duration
/// proportional timeout from `SpeakerRecognitionConfig::request_timeout_secs`.
struct SpeakerRecognitionHandler;

#[async_trait]
impl JobHandler for SpeakerRecognitionHandler {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value> {
        let cfg = &app.config.speaker_recognition;
        if !cfg.enabled {
            return Ok(serde_json::json!({"skipped": true}));
        }
        if cfg.base_url.is_empty() {
            return Err(Error::Config(
                "speaker_recognition.base_url is not configured".into(),
            ));
        }

        let conversation_id = job.meta_str("conversation_id").unwrap_or_default();
        let duration_secs = job
            .meta_str("audio_duration_secs")
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        let timeout = std::time::Duration::from_secs_f64(cfg.request_timeout_secs(duration_secs));

        let url = format!("{}/v1/diarize-identify-match", cfg.base_url.trim_end_matches('/'));
        let resp = app
            .http
            .post(&url)
            .timeout(timeout)
            .form(&[("conversation_id", conversation_id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::Provider {
                provider: "speaker-recognition".into(),
                message: format!("HTTP {}", resp.status()),
            });
        }

        resp.json::<Value>().await.map_err(|e| Error::Http(e.to_string()))
    }
}

fn conversation_id_of(job: &Job) -> Result<&str> {
    job.conversation_id().ok_or_else(|| Error::Validation {
        field: "conversation_id".into(),
        message: format!("job {} carries no conversation_id in meta", job.id),
    })
}

/// Extracts memory from the active (or explicitly targeted)
/// transcript version. This crate carries no LLM provider stack, so the
/// extraction itself is a heuristic stand-in — one memory entry per speech
/// segment — that still exercises the real append-a-version contract
/// `ConversationStore` callers depend on.
struct MemoryExtractionHandler;

#[async_trait]
impl JobHandler for MemoryExtractionHandler {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value> {
        let conversation_id = conversation_id_of(job)?;
        let mut conversation = app
            .conversations
            .load(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "conversation", id: conversation_id.to_string() })?;

        let transcript_version_id = match job.meta_str("transcript_version_id") {
            None | Some("active") => conversation
                .active_transcript_version
                .clone()
                .ok_or_else(|| Error::Validation {
                    field: "transcript_version_id".into(),
                    message: "conversation has no active transcript version".into(),
                })?,
            Some(id) => id.to_string(),
        };

        let segment_count = conversation
            .transcript_versions
            .iter()
            .find(|v| v.version_id == transcript_version_id)
            .map(|v| v.segments.iter().filter(|s| s.text.trim().len() > 0).count())
            .unwrap_or(0);

        let version = conversation.add_memory_version(
            format!("mem_{}", job.id),
            segment_count,
            transcript_version_id,
            chronicle_domain::conversation::MemoryProvider::Chronicle,
            None,
            None,
            true,
        );
        let memory_count = version.memory_count;
        app.conversations.save(&conversation).await?;

        Ok(serde_json::json!({"memory_count": memory_count}))
    }
}

/// Derives a title/summary from the active transcript's text. No LLM
/// provider is wired in, so this produces a deterministic heuristic
/// (first sentence as title, full transcript as summary) rather than
/// fabricating content an LLM would otherwise generate.
struct TitleSummaryHandler;

#[async_trait]
impl JobHandler for TitleSummaryHandler {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value> {
        let conversation_id = conversation_id_of(job)?;
        let mut conversation = app
            .conversations
            .load(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "conversation", id: conversation_id.to_string() })?;

        let transcript = conversation.transcript().unwrap_or_default().trim().to_string();
        let title = transcript
            .split(['.', '!', '?'])
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().take(80).collect::<String>());

        conversation.title = title.clone();
        conversation.summary = (!transcript.is_empty()).then(|| transcript.clone());
        app.conversations.save(&conversation).await?;

        Ok(serde_json::json!({"title": title, "summary": conversation.summary}))
    }
}

/// Reads the persisted audio file for `conversation_id` (§6:
/// `audio:file:{conversation_id}`) and appends a new transcript version
/// without touching the active pointer (§4.3 reprocessing semantics). No
/// batch STT provider is wired into this build, so the transcript text is
/// a clearly labeled placeholder rather than fabricated speech content —
/// the job still succeeds and the version still lands in
/// `transcript_versions`, which is what the reprocessing DAG depends on.
struct BatchTranscriptionHandler;

#[async_trait]
impl JobHandler for BatchTranscriptionHandler {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value> {
        let conversation_id = conversation_id_of(job)?;
        let mut conn = app.redis.clone();
        let file_path: Option<String> = redis::AsyncCommands::get(
            &mut conn,
            chronicle_audio::keys::audio_file_key(conversation_id),
        )
        .await
        .map_err(|e| Error::Redis(e.to_string()))?;
        let file_path = file_path.ok_or_else(|| Error::NotFound {
            kind: "audio_file",
            id: conversation_id.to_string(),
        })?;

        let (samples, sample_rate) = chronicle_audio::writer::decode_wav_file(&file_path)?;
        let duration_secs = samples.len() as f64 / sample_rate as f64;

        let mut conversation = app
            .conversations
            .load(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "conversation", id: conversation_id.to_string() })?;

        conversation.add_transcript_version(
            format!("batch_{}", job.id),
            Some("[batch transcription pending STT provider integration]".to_string()),
            Vec::new(),
            Vec::new(),
            Some("batch-placeholder".to_string()),
            None,
            Some(duration_secs),
            false,
        );
        app.conversations.save(&conversation).await?;

        Ok(serde_json::json!({
            "conversation_id": conversation_id,
            "duration_secs": duration_secs,
        }))
    }
}

/// Fires `conversation.complete` once both `memory` and `title_summary`
/// have resolved (the DAG already guarantees ordering; this handler just
/// emits the event).
struct EventDispatchHandler;

#[async_trait]
impl JobHandler for EventDispatchHandler {
    async fn handle(&self, app: &Application, job: &Job) -> Result<Value> {
        let user_id = job.meta_str("user_id").unwrap_or_default();
        let conversation_id = job.meta_str("conversation_id").unwrap_or_default();
        let mut data = serde_json::Map::new();
        data.insert("conversation_id".into(), serde_json::json!(conversation_id));

        let results = app
            .plugins
            .dispatch_event(
                "conversation.complete",
                user_id,
                AccessLevel::Conversation,
                &conversation_id,
                data,
                serde_json::Map::new(),
            )
            .await;

        Ok(serde_json::json!({ "plugin_results": results.len() }))
    }
}
