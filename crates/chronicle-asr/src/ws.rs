//! WebSocket lifecycle for one streaming STT session (§4.5 steps 2-5),
//! grounded on `NodeClient::connect_and_run`'s connect -> handshake ->
//! message-loop shape: a writer task fed by an mpsc channel, a reader loop
//! that classifies inbound frames, and `CancellationToken`-driven teardown.

use std::time::Duration;

use chronicle_domain::config::SttProviderConfig;
use chronicle_domain::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::provider::{render_start_message, ProviderMessage};
use crate::reconnect::ReconnectBackoff;

/// Drives one `audio:stream:{client_id}` session end to end: connects to
/// the provider, sends the start message, forwards audio frames pushed on
/// `audio_rx`, and emits classified [`ProviderMessage`]s on `out_tx`.
pub struct StreamSession {
    pub provider: SttProviderConfig,
    pub sample_rate: u32,
    pub diarization: bool,
    pub backoff: ReconnectBackoff,
}

impl StreamSession {
    pub fn new(provider: SttProviderConfig, sample_rate: u32) -> Self {
        let diarization = provider.has_capability("diarization");
        Self {
            provider,
            sample_rate,
            diarization,
            backoff: ReconnectBackoff::default(),
        }
    }

    fn connection_url(&self) -> String {
        let mut url = self.provider.url.clone();
        if self.provider.query_params.is_empty() {
            return url;
        }
        let sep = if url.contains('?') { "&" } else { "?" };
        url.push_str(sep);
        let pairs: Vec<String> = self
            .provider
            .query_params
            .iter()
            .map(|(k, v)| {
                let v = v
                    .replace("{sample_rate}", &self.sample_rate.to_string())
                    .replace(
                        "{diarize}",
                        if self.diarization { "true" } else { "false" },
                    );
                format!("{k}={v}")
            })
            .collect();
        url.push_str(&pairs.join("&"));
        url
    }

    /// Run the session until `shutdown` fires, reconnecting with
    /// [`ReconnectBackoff`] whenever the provider socket drops (§4.5 step
    /// 5: a dropped connection mid-session resumes rather than ending the
    /// job). `audio_rx` carries raw PCM/opus frames from the stream
    /// discovery loop; classified results go out on `out_tx`. Gives up
    /// only when `shutdown` fires or the backoff's `max_attempts` (if any)
    /// is exceeded.
    pub async fn run(
        &self,
        mut audio_rx: mpsc::Receiver<Vec<u8>>,
        out_tx: mpsc::Sender<ProviderMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            match self.run_once(&mut audio_rx, &out_tx, &shutdown).await {
                Ok(()) => return Ok(()),
                Err(e) if shutdown.is_cancelled() => return Err(e),
                Err(e) => {
                    if self.backoff.should_give_up(attempt) {
                        tracing::error!(provider = %self.provider.id, error = %e, attempt, "giving up after repeated reconnect failures");
                        return Err(e);
                    }
                    let delay = self.backoff.delay_for_attempt(attempt);
                    tracing::warn!(provider = %self.provider.id, error = %e, attempt, delay_ms = delay.as_millis() as u64, "streaming session dropped, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => return Ok(()),
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One connect -> handshake -> message-loop cycle. Returns `Ok(())` on
    /// a clean shutdown or provider-initiated close, `Err` on a connection
    /// or socket error so `run` can decide whether to reconnect.
    async fn run_once(
        &self,
        audio_rx: &mut mpsc::Receiver<Vec<u8>>,
        out_tx: &mpsc::Sender<ProviderMessage>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let url = self.connection_url();
        tracing::info!(provider = %self.provider.id, url = %url, "connecting to streaming provider");

        let (ws, _resp) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Provider {
                provider: self.provider.id.clone(),
                message: e.to_string(),
            })?;
        let (mut sink, mut stream) = ws.split();

        if let Some(start) = render_start_message(&self.provider, self.sample_rate, self.diarization) {
            let json = serde_json::to_string(&start).map_err(Error::Json)?;
            sink.send(Message::Text(json))
                .await
                .map_err(|e| Error::Provider {
                    provider: self.provider.id.clone(),
                    message: e.to_string(),
                })?;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Text(self.provider.end_message.to_string())).await;
                    return Ok(());
                }
                audio = audio_rx.recv() => {
                    match audio {
                        Some(bytes) => {
                            if let Err(e) = sink.send(Message::Binary(bytes)).await {
                                return Err(Error::Provider {
                                    provider: self.provider.id.clone(),
                                    message: e.to_string(),
                                });
                            }
                        }
                        None => return Ok(()),
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(classified) = self.classify(&text) {
                                if out_tx.send(classified).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(Error::Provider {
                                provider: self.provider.id.clone(),
                                message: "connection closed by provider".into(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(provider = %self.provider.id, error = %e, "provider socket error");
                            return Err(Error::Provider {
                                provider: self.provider.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn classify(&self, text: &str) -> Option<ProviderMessage> {
        let frame: serde_json::Value = serde_json::from_str(text).ok()?;
        let frame_type = frame.get("type").and_then(|v| v.as_str())?;

        let extracted_text = self
            .provider
            .extract_text_path
            .as_deref()
            .and_then(|path| extract_path(&frame, path))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let words = self
            .provider
            .extract_words_path
            .as_deref()
            .and_then(|path| extract_path(&frame, path))
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();

        if Some(frame_type) == self.provider.expect_final_type.as_deref() {
            Some(ProviderMessage::Final {
                text: extracted_text,
                words,
            })
        } else if Some(frame_type) == self.provider.expect_interim_type.as_deref() {
            Some(ProviderMessage::Interim {
                text: extracted_text,
                words,
            })
        } else {
            None
        }
    }
}

/// Resolve a dotted path like `data.channel.alternatives.0.transcript`
/// against a JSON value.
fn extract_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.get(index)?
        } else {
            current.get(segment)?
        };
    }
    Some(current)
}

/// How long to wait for inactivity before treating a session as idle
/// (closing the socket per §4.5 step 5), absent an explicit end marker.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_path_walks_nested_fields_and_array_index() {
        let value = serde_json::json!({
            "data": { "channel": { "alternatives": [{ "transcript": "hello" }] } }
        });
        let extracted = extract_path(&value, "data.channel.alternatives.0.transcript").unwrap();
        assert_eq!(extracted.as_str(), Some("hello"));
    }

    #[test]
    fn connection_url_substitutes_query_params() {
        let provider = SttProviderConfig {
            id: "p".into(),
            url: "wss://example.test/stream".into(),
            streaming: true,
            capabilities: vec!["diarization".into()],
            query_params: [("rate".to_string(), "{sample_rate}".to_string())]
                .into_iter()
                .collect(),
            start_message_template: None,
            end_message: serde_json::json!({ "type": "stop" }),
            expect_interim_type: None,
            expect_final_type: None,
            extract_text_path: None,
            extract_words_path: None,
            extract_segments_path: None,
        };
        let session = StreamSession::new(provider, 16_000);
        assert_eq!(
            session.connection_url(),
            "wss://example.test/stream?rate=16000"
        );
    }
}
