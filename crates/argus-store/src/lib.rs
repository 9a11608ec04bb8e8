//! argus-store — durable store for the Argus proxy group manager.
//!
//! Backed by [redb](https://docs.rs/redb), holds the monitoring fleet's
//! persistent state: proxy groups, hosts, proxies, proxy runtime data and
//! host-to-proxy assignments.
//!
//! # Architecture
//!
//! All rows are JSON-serialized into redb's `&[u8]` value columns, keyed
//! by their numeric entity id. The `MonitorStore` is `Clone` + `Send` +
//! `Sync` (backed by `Arc<Database>`) and can be shared across async
//! tasks. Flush-time mutations go through [`FlushTxn`], a single write
//! transaction covering every step of a persistence pass, so a pass is
//! either committed whole or not at all.

pub mod error;
pub mod flush;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use flush::{FlushStats, FlushTxn, INSERT_BATCH_SIZE};
pub use store::MonitorStore;
pub use types::*;
