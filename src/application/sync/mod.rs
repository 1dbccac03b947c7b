//! Realtime synchronization with the change feed.

pub mod manager;
pub mod state;

pub use manager::SyncManager;
pub use state::{ConnectionPhase, ConnectionState};
