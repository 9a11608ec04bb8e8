//! redb table definitions for the Argus monitoring store.
//!
//! Entity tables use `u64` ids as keys and `&[u8]` values
//! (JSON-serialized row types). The `ids` table holds named counters
//! keyed by `{table}/{field}`.

use redb::TableDefinition;

/// Proxy group status rows keyed by group id.
pub const PROXY_GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("proxy_group");

/// Monitored hosts keyed by host id.
pub const HOSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("hosts");

/// Proxy definitions keyed by proxy id.
pub const PROXIES: TableDefinition<u64, &[u8]> = TableDefinition::new("proxy");

/// Proxy runtime data (heartbeat timestamps) keyed by proxy id.
pub const PROXY_RTDATA: TableDefinition<u64, &[u8]> = TableDefinition::new("proxy_rtdata");

/// Host-to-proxy assignments keyed by host id.
pub const ASSIGNMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("host_proxy");

/// Named counters keyed by `{table}/{field}`.
pub const IDS: TableDefinition<&str, u64> = TableDefinition::new("ids");

/// Key of the assignment revision counter in [`IDS`].
pub const ASSIGNMENT_REVISION_KEY: &str = "host_proxy/revision";
