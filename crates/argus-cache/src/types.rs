//! Runtime entities held by the cache.
//!
//! Proxy objects are owned by the cache's proxy table; groups refer to
//! their members by id only, and each proxy carries a single back
//! reference to its owning group. Keeping ownership in one place is what
//! lets membership moves stay atomic under the cache lock.

use argus_store::{GroupId, GroupStatus, HostId, ProxyId, ProxyStatus};

/// A pool of monitoring proxies serving a set of hosts.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    /// Last structural version seen from the configuration source.
    pub revision: u64,
    /// Configuration sync marker; 0 means the group no longer exists
    /// upstream and must be removed.
    pub sync_revision: u64,
    /// Minimum healthy proxies required to keep serving.
    pub min_online: u32,
    /// Grace period in seconds, both for declaring a proxy offline and
    /// for trusting a freshly resumed heartbeat.
    pub failover_delay: u64,
    pub status: GroupStatus,
    /// Timestamp of the last status change.
    pub status_time: u64,
    /// Member proxies, by id.
    pub proxy_ids: Vec<ProxyId>,
    /// Hosts served by this group, by id.
    pub host_ids: Vec<HostId>,
    /// Hosts waiting for a proxy assignment.
    pub new_host_ids: Vec<HostId>,
    /// Status changed since the last flush.
    pub status_dirty: bool,
    /// Host mapping changed since the last flush.
    pub assignments_dirty: bool,
}

impl Group {
    pub fn new(id: GroupId, revision: u64, min_online: u32, failover_delay: u64) -> Self {
        Self {
            id,
            revision,
            sync_revision: revision,
            min_online,
            failover_delay,
            status: GroupStatus::Unknown,
            status_time: 0,
            proxy_ids: Vec::new(),
            host_ids: Vec::new(),
            new_host_ids: Vec::new(),
            status_dirty: false,
            assignments_dirty: false,
        }
    }
}

/// A monitoring proxy and its heartbeat bookkeeping.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub id: ProxyId,
    pub name: String,
    pub status: ProxyStatus,
    /// Last heartbeat timestamp.
    pub lastaccess: u64,
    /// Start of the current continuous-uptime streak; 0 when not
    /// streaking.
    pub firstaccess: u64,
    /// Owning group; 0 while detached between relocations.
    pub group_id: GroupId,
    /// Hosts currently assigned to this proxy.
    pub host_ids: Vec<HostId>,
}

impl Proxy {
    pub fn new(id: ProxyId, group_id: GroupId, name: &str, lastaccess: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: ProxyStatus::Unknown,
            lastaccess,
            firstaccess: 0,
            group_id,
            host_ids: Vec::new(),
        }
    }
}

/// A proxy move between groups, queued by the relocation event source.
///
/// `src`/`dst` of `None` mean "not previously in a group" and "released
/// from the fleet" respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEvent {
    pub proxy_id: ProxyId,
    pub src: Option<GroupId>,
    pub dst: Option<GroupId>,
}

/// Snapshot of one group's pending persistence work, produced by a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupUpdate {
    pub group_id: GroupId,
    pub status: GroupStatus,
    /// The group's status row needs rewriting.
    pub status_changed: bool,
    /// The group's host mapping changed and consumers must be told the
    /// new assignment revision.
    pub assignments_changed: bool,
}
