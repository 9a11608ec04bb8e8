//! Domain types shared between the store and the in-memory cache.
//!
//! Row types are what the store persists; the status enums are also the
//! runtime vocabulary of the health state machine. All row types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier of a proxy group.
pub type GroupId = u64;

/// Unique identifier of a monitoring proxy.
pub type ProxyId = u64;

/// Unique identifier of a monitored host.
pub type HostId = u64;

// ── Statuses ──────────────────────────────────────────────────────

/// Aggregate serving status of a proxy group.
///
/// `Decay` and `Recovery` are hysteresis states: a serving group first
/// decays before it can go offline, and an offline group first recovers
/// before it serves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Unknown,
    Online,
    Offline,
    Recovery,
    Decay,
}

/// Heartbeat-derived status of a single proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    Unknown,
    Online,
    Offline,
}

// ── Rows ──────────────────────────────────────────────────────────

/// Persisted status of a proxy group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyGroupRow {
    pub group_id: GroupId,
    pub status: GroupStatus,
}

/// A monitored host and the group it is served by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRow {
    pub host_id: HostId,
    pub group_id: GroupId,
}

/// A proxy definition: display name and owning group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyRow {
    pub proxy_id: ProxyId,
    pub group_id: GroupId,
    pub name: String,
}

/// Proxy runtime data — the last heartbeat timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RtdataRow {
    pub proxy_id: ProxyId,
    pub lastaccess: u64,
}

/// Durable binding of a host to its currently serving proxy.
///
/// `revision` is the assignment version the row was written under;
/// consumers compare revisions with `>=`, never `==`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HostAssignment {
    pub host_id: HostId,
    pub proxy_id: ProxyId,
    pub revision: u64,
}
