use std::sync::Arc;

use chronicle_domain::config::Config;
use chronicle_supervisor::ProcessManager;
use redis::aio::ConnectionManager;

/// Shared state for the admin HTTP surface, grounded on `gateway/src/state.rs`'s
/// `AppState` (owned `Arc`-wrapped subsystem handles, `Clone`-able for axum).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<ProcessManager>,
    pub redis: ConnectionManager,
}
