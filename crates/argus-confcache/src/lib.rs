//! argus-confcache — the in-process configuration cache.
//!
//! Owned by the configuration subsystem in the full platform; the proxy
//! group manager consumes three things from it: the upstream group set
//! with its structural revision, the proxy heartbeat feed, and a place
//! to publish the host-map revision after a successful flush so
//! dependent consumers can selectively invalidate.
//!
//! The feeder surface (`put_group`, `remove_group`, `set_lastaccess`)
//! is what the transport side of the platform — and the tests — drive.

pub mod confcache;

pub use confcache::{ConfCache, GroupConfig};
