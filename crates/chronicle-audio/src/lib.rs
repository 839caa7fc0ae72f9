//! Audio session plane (C3): stream key naming, conversation rotation, the
//! persistence job's termination state machine, and the stuck-stream
//! reaper.

pub mod keys;
pub mod pcm;
pub mod reaper;
pub mod session;
pub mod stream_store;
pub mod writer;

pub use keys::{SessionStatus, PERSISTENCE_GROUP};
pub use pcm::decode_i16le;
pub use reaper::{reap_stuck_streams, ReapReport, StreamCleanupResult};
pub use session::{
    EndMarkerDrain, RotationAction, RotationTracker, SessionSnapshot, TerminationReason,
    MAX_JOB_DURATION_SECS,
};
pub use stream_store::{ConsumerInfo, MemoryStreamStore, RedisStreamStore, StreamStore};
pub use writer::PersistenceWriter;
