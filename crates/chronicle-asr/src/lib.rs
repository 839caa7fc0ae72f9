//! Streaming ASR consumer (C4): provider contract, WebSocket session
//! lifecycle, discovery-loop bookkeeping, word/segment normalization, and
//! speaker-window gating.

pub mod discovery;
pub mod normalize;
pub mod provider;
pub mod reconnect;
pub mod speaker_window;
pub mod ws;

pub use discovery::StreamRegistry;
pub use normalize::{group_words_into_segments, should_dispatch_transcript_event};
pub use provider::{render_start_message, BatchProvider, BatchTranscript, ProviderMessage};
pub use reconnect::ReconnectBackoff;
pub use speaker_window::SpeakerWindowBuffer;
pub use ws::{StreamSession, SESSION_IDLE_TIMEOUT};
