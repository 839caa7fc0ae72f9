//! DAG-factory helpers (C2): wire the fixed job graphs the orchestrator
//! hands out for a streaming session and for post-conversation processing.
//! Mirrors `start_streaming_jobs` / `start_post_conversation_jobs` exactly,
//! down to job-id prefixes, timeouts, and dependency wiring.

use chronicle_domain::config::QueueConfig;
use chronicle_domain::job::{Job, JobRole, JobSpec};
use chronicle_domain::Result;
use serde_json::json;

use crate::store::JobQueue;

/// TTL on the `speech_detection_job:{client_id}` fast-lookup key (§4.4's
/// key-namespace listing). The audio-persistence job polls for this key's
/// existence to detect that its companion streaming-session bookkeeping
/// has died (`TerminationReason::JobZombie`).
const SPEECH_DETECTION_JOB_TTL_SECS: u64 = 86_400;

/// IDs of the two jobs started the moment a client opens an audio
/// streaming session (§4.2).
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamingJobs {
    pub speech_detection: String,
    pub audio_persistence: String,
}

/// Start the two streaming-session jobs. Both run for the lifetime of the
/// session (up to 24h) and carry no dependency on each other.
pub async fn start_streaming_jobs(
    queue: &JobQueue,
    cfg: &QueueConfig,
    session_id: &str,
    client_id: &str,
) -> Result<StreamingJobs> {
    let short = short_id(session_id);

    let speech_job = queue
        .enqueue(
            JobSpec::new(
                format!("speech-detect_{short}"),
                JobRole::StreamSpeechDetection,
                json!({ "session_id": session_id, "client_id": client_id }),
            )
            .timeout_secs(cfg.streaming_job_timeout_secs)
            .meta("client_id", client_id)
            .meta("session_id", session_id),
            JobRole::StreamSpeechDetection.queue(),
        )
        .await?;

    let audio_job = queue
        .enqueue(
            JobSpec::new(
                format!("audio-persist_{short}"),
                JobRole::AudioStreamingPersistence,
                json!({ "session_id": session_id, "client_id": client_id }),
            )
            .timeout_secs(cfg.streaming_job_timeout_secs)
            .meta("client_id", client_id)
            .meta("session_id", session_id),
            JobRole::AudioStreamingPersistence.queue(),
        )
        .await?;

    queue
        .register_fast_lookup(
            &format!("speech_detection_job:{client_id}"),
            &speech_job.id,
            SPEECH_DETECTION_JOB_TTL_SECS,
        )
        .await?;

    Ok(StreamingJobs {
        speech_detection: speech_job.id,
        audio_persistence: audio_job.id,
    })
}

/// IDs of the post-conversation processing DAG (§4.2, §4.3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PostConversationJobs {
    pub speaker_recognition: Option<String>,
    pub memory: String,
    pub title_summary: String,
    pub event_dispatch: String,
}

/// Start the post-conversation job graph:
///
/// ```text
/// [depends_on_job?] -> speaker_recognition -> memory      \
///                   \-> title_summary                      -> event_dispatch
/// ```
///
/// `speaker_recognition` is skipped when disabled in config, in which case
/// `memory` and `title_summary` fall back to depending directly on
/// `depends_on_job` (e.g. a transcription job for file uploads).
pub async fn start_post_conversation_jobs(
    queue: &JobQueue,
    cfg: &QueueConfig,
    conversation_id: &str,
    client_id: &str,
    depends_on_job: Option<&Job>,
) -> Result<PostConversationJobs> {
    let short = short_id(conversation_id);
    let mut speaker_dependency: Vec<String> =
        depends_on_job.map(|j| vec![j.id.clone()]).unwrap_or_default();

    let speaker_recognition = if cfg.speaker_recognition_enabled {
        let speaker_job = queue
            .enqueue(
                JobSpec::new(
                    format!("speaker_{short}"),
                    JobRole::RecogniseSpeakers,
                    json!({ "conversation_id": conversation_id }),
                )
                .timeout_secs(cfg.speaker_recognition_timeout_secs)
                .depends_on(speaker_dependency.clone())
                .meta("client_id", client_id)
                .meta("conversation_id", conversation_id),
                JobRole::RecogniseSpeakers.queue(),
            )
            .await?;
        speaker_dependency = vec![speaker_job.id.clone()];
        Some(speaker_job.id)
    } else {
        None
    };

    let memory_job = queue
        .enqueue(
            JobSpec::new(
                format!("memory_{short}"),
                JobRole::ProcessMemory,
                json!({ "conversation_id": conversation_id }),
            )
            .timeout_secs(cfg.memory_timeout_secs)
            .depends_on(speaker_dependency.clone())
            .meta("client_id", client_id)
            .meta("conversation_id", conversation_id),
            JobRole::ProcessMemory.queue(),
        )
        .await?;

    // Title/summary depends on the speaker job (or upstream), NOT on memory.
    let title_summary_job = queue
        .enqueue(
            JobSpec::new(
                format!("title_summary_{short}"),
                JobRole::GenerateTitleSummary,
                json!({ "conversation_id": conversation_id }),
            )
            .timeout_secs(cfg.title_summary_timeout_secs)
            .depends_on(speaker_dependency)
            .meta("client_id", client_id)
            .meta("conversation_id", conversation_id),
            JobRole::GenerateTitleSummary.queue(),
        )
        .await?;

    let event_dispatch_job = queue
        .enqueue(
            JobSpec::new(
                format!("event_complete_{short}"),
                JobRole::DispatchConversationCompleteEvent,
                json!({ "conversation_id": conversation_id }),
            )
            .timeout_secs(cfg.event_dispatch_timeout_secs)
            .depends_on([memory_job.id.clone(), title_summary_job.id.clone()])
            .meta("client_id", client_id)
            .meta("conversation_id", conversation_id),
            JobRole::DispatchConversationCompleteEvent.queue(),
        )
        .await?;

    Ok(PostConversationJobs {
        speaker_recognition,
        memory: memory_job.id,
        title_summary: title_summary_job.id,
        event_dispatch: event_dispatch_job.id,
    })
}

/// Re-run memory extraction against a specific (already-activated)
/// transcript version, independent of the original post-conversation run
/// (§4.3 reprocessing).
pub async fn reprocess_memory(
    queue: &JobQueue,
    cfg: &QueueConfig,
    conversation_id: &str,
    client_id: &str,
    transcript_version_id: &str,
) -> Result<Job> {
    let short = short_id(conversation_id);
    queue
        .enqueue(
            JobSpec::new(
                format!("memory-reprocess_{short}-{transcript_version_id}"),
                JobRole::ProcessMemory,
                json!({
                    "conversation_id": conversation_id,
                    "transcript_version_id": transcript_version_id,
                }),
            )
            .timeout_secs(cfg.memory_timeout_secs)
            .meta("client_id", client_id)
            .meta("conversation_id", conversation_id)
            .meta("reprocess", true),
            JobRole::ProcessMemory.queue(),
        )
        .await
}

/// Re-run full-audio transcription, producing a new transcript version
/// without touching the conversation's active version pointer (§4.3).
pub async fn reprocess_transcript(
    queue: &JobQueue,
    cfg: &QueueConfig,
    conversation_id: &str,
    client_id: &str,
    provider: &str,
) -> Result<Job> {
    let short = short_id(conversation_id);
    queue
        .enqueue(
            JobSpec::new(
                format!("transcript-reprocess_{short}-{provider}"),
                JobRole::TranscribeFullAudio,
                json!({ "conversation_id": conversation_id, "provider": provider }),
            )
            .timeout_secs(cfg.transcribe_timeout_secs)
            .meta("client_id", client_id)
            .meta("conversation_id", conversation_id)
            .meta("reprocess", true),
            JobRole::TranscribeFullAudio.queue(),
        )
        .await
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::job::JobStatus;

    #[tokio::test]
    async fn streaming_jobs_have_24h_timeout_and_no_mutual_dependency() {
        let q = JobQueue::in_memory();
        let cfg = QueueConfig::default();
        let jobs = start_streaming_jobs(&q, &cfg, "session-123456789abc", "client-1")
            .await
            .unwrap();
        let speech = q.fetch(&jobs.speech_detection).await.unwrap().unwrap();
        let audio = q.fetch(&jobs.audio_persistence).await.unwrap().unwrap();
        assert_eq!(speech.timeout_secs, 86_400);
        assert_eq!(audio.timeout_secs, 86_400);
        assert_eq!(speech.status, JobStatus::Queued);
        assert_eq!(audio.status, JobStatus::Queued);

        let registered = q.fast_lookup("speech_detection_job:client-1").await.unwrap();
        assert_eq!(registered.as_deref(), Some(jobs.speech_detection.as_str()));
    }

    #[tokio::test]
    async fn post_conversation_dag_wires_event_dispatch_on_both_parallel_jobs() {
        let q = JobQueue::in_memory();
        let cfg = QueueConfig::default();
        let jobs = start_post_conversation_jobs(&q, &cfg, "conv-123456789abc", "client-1", None)
            .await
            .unwrap();
        let event = q.fetch(&jobs.event_dispatch).await.unwrap().unwrap();
        assert_eq!(event.status, JobStatus::Deferred);
        assert!(event.depends_on.contains(&jobs.memory));
        assert!(event.depends_on.contains(&jobs.title_summary));

        q.mark_finished(&jobs.speaker_recognition.clone().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(q.fetch(&jobs.memory).await.unwrap().unwrap().status, JobStatus::Queued);
        assert_eq!(
            q.fetch(&jobs.title_summary).await.unwrap().unwrap().status,
            JobStatus::Queued
        );
    }

    #[tokio::test]
    async fn disabling_speaker_recognition_skips_that_stage() {
        let q = JobQueue::in_memory();
        let mut cfg = QueueConfig::default();
        cfg.speaker_recognition_enabled = false;
        let jobs = start_post_conversation_jobs(&q, &cfg, "conv-123456789abc", "client-1", None)
            .await
            .unwrap();
        assert!(jobs.speaker_recognition.is_none());
        assert_eq!(q.fetch(&jobs.memory).await.unwrap().unwrap().status, JobStatus::Queued);
    }
}
