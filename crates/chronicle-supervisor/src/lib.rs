//! Worker supervisor (C8): subprocess lifecycle management, cluster health
//! monitoring, and conditional worker-definition resolution.

pub mod health_monitor;
pub mod managed_worker;
pub mod process_manager;
pub mod registry;
pub mod state;

pub use health_monitor::HealthMonitor;
pub use managed_worker::ManagedWorker;
pub use process_manager::{ProcessManager, RestartTiming, WorkerStatus};
pub use registry::build_worker_definitions;
pub use state::WorkerState;
