//! Plugin event router (C6): trigger-condition evaluation, dispatch
//! contract, and failure-isolated invocation.

pub mod condition;
pub mod handler;
pub mod router;

pub use condition::{evaluate, Trigger};
pub use handler::PluginHandler;
pub use router::{PluginRouter, RecentEventLog};
