//! argus-cache — the proxy group manager's shared mutable state.
//!
//! One aggregate [`CacheState`] holds the group, proxy and assignment
//! tables plus every pending-change queue, guarded by a single lock
//! ([`Cache`]). Coarse locking is deliberate: every pass over the cache
//! costs O(fleet size) in memory and performs no I/O while holding the
//! guard, and a single lock keeps "a proxy belongs to exactly one group"
//! trivially atomic.

pub mod cache;
pub mod types;

pub use cache::{Cache, CacheState, DrainedUpdates};
pub use types::{Group, GroupUpdate, Proxy, RelocationEvent};
