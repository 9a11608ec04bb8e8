//! argus-manager — the proxy group manager.
//!
//! Decides which monitoring proxy serves each host and whether each
//! proxy group is healthy enough to serve at all. One control loop ties
//! four passes over the shared cache together:
//!
//! - **group sync** reconciles group existence and revisions from the
//!   configuration cache,
//! - **status evaluation** runs the per-proxy heartbeat debounce and the
//!   per-group hysteresis state machine,
//! - **relocation handling** applies proxy moves between groups,
//! - **flushing** drains cache deltas and commits them to the store as
//!   one transaction, then publishes the new assignment revision.
//!
//! All store I/O happens with the cache lock released; results are
//! applied under a re-acquired lock.

pub mod bootstrap;
pub mod error;
pub mod evaluator;
pub mod flusher;
pub mod manager;
pub mod relocation;
pub mod service;
pub mod sync;

pub use error::{ManagerError, ManagerResult};
pub use manager::GroupManager;
pub use service::{CacheStats, GroupSnapshot, ManagerService};
