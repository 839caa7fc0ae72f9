//! STT provider contract (§4.5, §6). A provider is either batch (one-shot
//! HTTP transcription of a full file) or streaming (WebSocket, incremental
//! interim/final results).

use chronicle_domain::config::SttProviderConfig;
use chronicle_domain::Result;

/// A message emitted by a streaming provider while processing one session.
#[derive(Debug, Clone)]
pub enum ProviderMessage {
    Interim { text: String, words: Vec<serde_json::Value> },
    Final { text: String, words: Vec<serde_json::Value> },
}

/// Batch (whole-file) transcription provider.
#[async_trait::async_trait]
pub trait BatchProvider: Send + Sync {
    async fn transcribe(&self, audio: &[u8], sample_rate: u32) -> Result<BatchTranscript>;
}

#[derive(Debug, Clone)]
pub struct BatchTranscript {
    pub text: String,
    pub words: Vec<serde_json::Value>,
    pub segments: Vec<serde_json::Value>,
}

/// Configuration-driven helper shared by batch and streaming providers: the
/// start-of-stream message with `{sample_rate}`/`{diarization}`-style
/// placeholders filled in (§4.5 step 2, booleans lowercased).
pub fn render_start_message(
    cfg: &SttProviderConfig,
    sample_rate: u32,
    diarization: bool,
) -> Option<serde_json::Value> {
    let template = cfg.start_message_template.clone()?;
    Some(substitute(template, sample_rate, diarization))
}

fn substitute(value: serde_json::Value, sample_rate: u32, diarization: bool) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            let replaced = s
                .replace("{sample_rate}", &sample_rate.to_string())
                .replace("{diarization}", if diarization { "true" } else { "false" });
            serde_json::Value::String(replaced)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, sample_rate, diarization))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, sample_rate, diarization)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cfg() -> SttProviderConfig {
        SttProviderConfig {
            id: "test".into(),
            url: "wss://example.test/stream".into(),
            streaming: true,
            capabilities: vec!["diarization".into()],
            query_params: Default::default(),
            start_message_template: Some(serde_json::json!({
                "type": "start",
                "sample_rate": "{sample_rate}",
                "diarize": "{diarization}"
            })),
            end_message: serde_json::json!({ "type": "stop" }),
            expect_interim_type: None,
            expect_final_type: None,
            extract_text_path: None,
            extract_words_path: None,
            extract_segments_path: None,
        }
    }

    #[test]
    fn render_start_message_substitutes_placeholders() {
        let cfg = sample_cfg();
        let rendered = render_start_message(&cfg, 16_000, true).unwrap();
        assert_eq!(rendered["sample_rate"], "16000");
        assert_eq!(rendered["diarize"], "true");
    }
}
