//! Job-queue primitive and pipeline orchestrator (C1, C2).

mod pipeline;
mod queue_store;
mod store;

pub use pipeline::{
    reprocess_memory, reprocess_transcript, start_post_conversation_jobs, start_streaming_jobs,
    PostConversationJobs, StreamingJobs,
};
pub use queue_store::{MemoryQueueStore, QueueStore, RedisQueueStore};
pub use store::{JobEvent, JobQueue, PerQueueCounts, QueueStats};
