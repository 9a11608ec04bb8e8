//! The cache proper: tables, queues and the flush drain.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use argus_store::{GroupId, HostAssignment, HostId, ProxyId, ProxyStatus};

use crate::types::{Group, GroupUpdate, Proxy, RelocationEvent};

/// Everything a flush pass needs, removed from the cache in one step.
#[derive(Debug, Default)]
pub struct DrainedUpdates {
    pub groups: Vec<GroupUpdate>,
    pub new: Vec<HostAssignment>,
    pub modified: Vec<HostAssignment>,
    pub deleted: Vec<HostId>,
}

impl DrainedUpdates {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.new.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
    }
}

/// The aggregate fleet state. All mutation happens through methods on
/// this type while the [`Cache`] lock is held.
#[derive(Debug)]
pub struct CacheState {
    pub groups: HashMap<GroupId, Group>,
    pub proxies: HashMap<ProxyId, Proxy>,
    pub assignments: HashMap<HostId, HostAssignment>,
    /// Pending proxy moves, drained once per tick.
    relocations: Vec<RelocationEvent>,
    /// Groups queued for a status/persistence pass; one entry per group.
    group_updates: Vec<GroupId>,
    /// Assignment rows that must be deleted at the next flush.
    pending_deletes: Vec<HostId>,
    /// Cache-wide structural revision of the group set.
    pub group_revision: u64,
    /// Cache-wide assignment revision, bumped once per drain that
    /// carries assignment deltas.
    pub assignment_revision: u64,
    /// Process start, for the offline-decision grace window.
    pub startup_time: u64,
}

impl CacheState {
    pub fn new(assignment_revision: u64, startup_time: u64) -> Self {
        Self {
            groups: HashMap::new(),
            proxies: HashMap::new(),
            assignments: HashMap::new(),
            relocations: Vec::new(),
            group_updates: Vec::new(),
            pending_deletes: Vec::new(),
            group_revision: 0,
            assignment_revision,
            startup_time,
        }
    }

    // ── Membership ─────────────────────────────────────────────────

    /// Attach a proxy to a group, creating the proxy if the cache does
    /// not know it yet. Maintains the member list and the back reference
    /// together. Returns `None` when the group is unknown.
    pub fn group_add_proxy(
        &mut self,
        group_id: GroupId,
        proxy_id: ProxyId,
        name: &str,
        lastaccess: u64,
    ) -> Option<&mut Proxy> {
        let group = self.groups.get_mut(&group_id)?;
        if !group.proxy_ids.contains(&proxy_id) {
            group.proxy_ids.push(proxy_id);
        }

        let proxy = self
            .proxies
            .entry(proxy_id)
            .or_insert_with(|| Proxy::new(proxy_id, group_id, name, lastaccess));
        proxy.group_id = group_id;
        Some(proxy)
    }

    /// Detach a proxy from a group. The proxy object stays in the cache,
    /// and the hosts it served are returned to the group's unassigned
    /// pool for re-pointing.
    pub fn group_remove_proxy(&mut self, group_id: GroupId, proxy_id: ProxyId) -> bool {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return false;
        };
        group.proxy_ids.retain(|&id| id != proxy_id);

        let Some(proxy) = self.proxies.get_mut(&proxy_id) else {
            return false;
        };
        proxy.group_id = 0;
        for host_id in proxy.host_ids.drain(..) {
            if !group.new_host_ids.contains(&host_id) {
                group.new_host_ids.push(host_id);
            }
        }
        true
    }

    /// Drop a proxy from the cache entirely. Its assignments are queued
    /// for deletion; hosts still served by the owning group go back to
    /// that group's unassigned pool.
    pub fn release_proxy(&mut self, proxy_id: ProxyId) {
        let Some(proxy) = self.proxies.remove(&proxy_id) else {
            return;
        };

        if let Some(group) = self.groups.get_mut(&proxy.group_id) {
            group.proxy_ids.retain(|&id| id != proxy_id);
        }

        for host_id in proxy.host_ids {
            self.assignments.remove(&host_id);
            self.pending_deletes.push(host_id);
            if let Some(group) = self.groups.get_mut(&proxy.group_id)
                && group.host_ids.contains(&host_id)
                && !group.new_host_ids.contains(&host_id)
            {
                group.new_host_ids.push(host_id);
            }
        }
        debug!(proxy_id, "proxy released from cache");
    }

    /// Destroy a group: releases member proxies, deletes its hosts'
    /// assignments and removes the group. Destructive and unrecoverable.
    pub fn remove_group(&mut self, group_id: GroupId) {
        let Some(group) = self.groups.remove(&group_id) else {
            return;
        };

        for proxy_id in &group.proxy_ids {
            self.proxies.remove(proxy_id);
        }
        for host_id in group.host_ids {
            if self.assignments.remove(&host_id).is_some() {
                self.pending_deletes.push(host_id);
            }
        }
        self.group_updates.retain(|&id| id != group_id);
        warn!(group_id, "group removed from cache");
    }

    // ── Queues ─────────────────────────────────────────────────────

    /// Queue a group for the next status/persistence pass. Re-queuing an
    /// already queued group is a no-op.
    pub fn queue_group_update(&mut self, group_id: GroupId) {
        if !self.group_updates.contains(&group_id) {
            self.group_updates.push(group_id);
        }
    }

    /// Queue an assignment row for deletion at the next flush.
    pub fn queue_assignment_delete(&mut self, host_id: HostId) {
        self.assignments.remove(&host_id);
        self.pending_deletes.push(host_id);
    }

    /// Append a relocation event.
    pub fn queue_relocation(&mut self, event: RelocationEvent) {
        self.relocations.push(event);
    }

    /// Take the whole relocation queue for one handler pass.
    pub fn take_relocations(&mut self) -> Vec<RelocationEvent> {
        std::mem::take(&mut self.relocations)
    }

    pub fn has_relocations(&self) -> bool {
        !self.relocations.is_empty()
    }

    /// Whether a flush pass has any work to pick up.
    pub fn has_pending_updates(&self) -> bool {
        !self.group_updates.is_empty() || !self.pending_deletes.is_empty()
    }

    /// Ids currently queued for a group pass (evaluation order).
    pub fn queued_group_ids(&self) -> Vec<GroupId> {
        self.group_updates.clone()
    }

    // ── Drain ──────────────────────────────────────────────────────

    /// Remove and return all pending persistence work.
    ///
    /// Distributes each queued group's unassigned hosts over its online
    /// members (fewest assigned hosts first), bumps the assignment
    /// revision once if any assignment delta exists, and clears the
    /// queues and dirty flags. Called once per flush with the lock held.
    pub fn drain_updates(&mut self) -> DrainedUpdates {
        let mut drained = DrainedUpdates {
            deleted: std::mem::take(&mut self.pending_deletes),
            ..Default::default()
        };

        let revision = self.assignment_revision + 1;
        let queued = std::mem::take(&mut self.group_updates);

        for group_id in queued {
            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };

            let mut online: Vec<ProxyId> = group
                .proxy_ids
                .iter()
                .copied()
                .filter(|id| {
                    self.proxies
                        .get(id)
                        .is_some_and(|p| p.status == ProxyStatus::Online)
                })
                .collect();

            if !online.is_empty() {
                for host_id in std::mem::take(&mut group.new_host_ids) {
                    // Fewest assigned hosts first.
                    online.sort_by_key(|id| self.proxies[id].host_ids.len());
                    let proxy_id = online[0];
                    if let Some(proxy) = self.proxies.get_mut(&proxy_id) {
                        proxy.host_ids.push(host_id);
                    }

                    let row = HostAssignment { host_id, proxy_id, revision };
                    match self.assignments.insert(host_id, row) {
                        Some(_) => drained.modified.push(row),
                        None => drained.new.push(row),
                    }
                    group.assignments_dirty = true;
                }
            }

            drained.groups.push(GroupUpdate {
                group_id,
                status: group.status,
                status_changed: group.status_dirty,
                assignments_changed: group.assignments_dirty,
            });
            group.status_dirty = false;
            group.assignments_dirty = false;
        }

        if !drained.new.is_empty() || !drained.modified.is_empty() || !drained.deleted.is_empty()
        {
            self.assignment_revision = revision;
        }

        drained
    }
}

/// The single lock guarding the fleet state.
pub struct Cache {
    inner: Mutex<CacheState>,
}

impl Cache {
    pub fn new(state: CacheState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Acquire the cache lock. Held for the duration of a pass; all
    /// store I/O happens with the guard released.
    pub async fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_store::GroupStatus;

    fn state_with_group(group_id: GroupId) -> CacheState {
        let mut state = CacheState::new(0, 1000);
        state
            .groups
            .insert(group_id, Group::new(group_id, 1, 1, 60));
        state
    }

    fn add_online_proxy(state: &mut CacheState, group_id: GroupId, proxy_id: ProxyId) {
        let proxy = state.group_add_proxy(group_id, proxy_id, "p", 0).unwrap();
        proxy.status = ProxyStatus::Online;
    }

    #[test]
    fn add_proxy_maintains_both_sides() {
        let mut state = state_with_group(1);
        state.group_add_proxy(1, 11, "edge-a", 500);

        assert_eq!(state.groups[&1].proxy_ids, vec![11]);
        assert_eq!(state.proxies[&11].group_id, 1);
        assert_eq!(state.proxies[&11].name, "edge-a");
    }

    #[test]
    fn add_existing_proxy_does_not_duplicate_membership() {
        let mut state = state_with_group(1);
        state.group_add_proxy(1, 11, "edge-a", 0);
        state.group_add_proxy(1, 11, "edge-a", 0);

        assert_eq!(state.groups[&1].proxy_ids, vec![11]);
    }

    #[test]
    fn remove_proxy_requeues_its_hosts() {
        let mut state = state_with_group(1);
        state.group_add_proxy(1, 11, "edge-a", 0);
        state.proxies.get_mut(&11).unwrap().host_ids = vec![101, 102];

        assert!(state.group_remove_proxy(1, 11));
        assert!(state.groups[&1].proxy_ids.is_empty());
        assert_eq!(state.proxies[&11].group_id, 0);
        assert_eq!(state.groups[&1].new_host_ids, vec![101, 102]);
    }

    #[test]
    fn release_proxy_deletes_its_assignments() {
        let mut state = state_with_group(1);
        state.groups.get_mut(&1).unwrap().host_ids = vec![101];
        state.group_add_proxy(1, 11, "edge-a", 0);
        state.proxies.get_mut(&11).unwrap().host_ids = vec![101];
        state
            .assignments
            .insert(101, HostAssignment { host_id: 101, proxy_id: 11, revision: 1 });

        state.release_proxy(11);

        assert!(!state.proxies.contains_key(&11));
        assert!(state.assignments.is_empty());
        assert_eq!(state.groups[&1].new_host_ids, vec![101]);

        let drained = state.drain_updates();
        assert_eq!(drained.deleted, vec![101]);
    }

    #[test]
    fn remove_group_releases_members_and_assignments() {
        let mut state = state_with_group(1);
        state.groups.get_mut(&1).unwrap().host_ids = vec![101, 102];
        state.group_add_proxy(1, 11, "edge-a", 0);
        state
            .assignments
            .insert(101, HostAssignment { host_id: 101, proxy_id: 11, revision: 1 });
        state.queue_group_update(1);

        state.remove_group(1);

        assert!(state.groups.is_empty());
        assert!(state.proxies.is_empty());
        assert!(state.assignments.is_empty());

        // The queue entry is gone, but the delete still flushes.
        assert!(state.has_pending_updates());
        let drained = state.drain_updates();
        assert!(drained.groups.is_empty());
        assert_eq!(drained.deleted, vec![101]);
    }

    #[test]
    fn queue_group_update_is_idempotent() {
        let mut state = state_with_group(1);
        state.queue_group_update(1);
        state.queue_group_update(1);
        state.queue_group_update(1);

        assert_eq!(state.queued_group_ids(), vec![1]);
    }

    #[test]
    fn drain_assigns_new_hosts_to_least_loaded_online_proxy() {
        let mut state = state_with_group(1);
        add_online_proxy(&mut state, 1, 11);
        add_online_proxy(&mut state, 1, 12);
        state.proxies.get_mut(&11).unwrap().host_ids = vec![101];

        let group = state.groups.get_mut(&1).unwrap();
        group.host_ids = vec![101, 102, 103];
        group.new_host_ids = vec![102, 103];
        state.queue_group_update(1);

        let drained = state.drain_updates();

        // 102 goes to the empty proxy 12, then 103 balances back.
        assert_eq!(drained.new.len(), 2);
        assert!(drained.modified.is_empty());
        assert_eq!(state.assignments[&102].proxy_id, 12);
        assert_eq!(state.proxies[&11].host_ids.len(), 2);
        assert_eq!(state.proxies[&12].host_ids.len(), 1);
        assert!(state.groups[&1].new_host_ids.is_empty());
    }

    #[test]
    fn drain_repoints_hosts_with_existing_assignments() {
        let mut state = state_with_group(1);
        add_online_proxy(&mut state, 1, 12);
        state
            .assignments
            .insert(101, HostAssignment { host_id: 101, proxy_id: 11, revision: 1 });

        let group = state.groups.get_mut(&1).unwrap();
        group.host_ids = vec![101];
        group.new_host_ids = vec![101];
        state.queue_group_update(1);

        let drained = state.drain_updates();

        assert!(drained.new.is_empty());
        assert_eq!(drained.modified.len(), 1);
        assert_eq!(drained.modified[0].proxy_id, 12);
        assert_eq!(state.assignments[&101].proxy_id, 12);
    }

    #[test]
    fn drain_without_online_proxies_keeps_hosts_queued() {
        let mut state = state_with_group(1);
        state.group_add_proxy(1, 11, "edge-a", 0); // Unknown status.

        let group = state.groups.get_mut(&1).unwrap();
        group.new_host_ids = vec![101];
        state.queue_group_update(1);

        let drained = state.drain_updates();

        assert!(drained.new.is_empty());
        assert_eq!(state.groups[&1].new_host_ids, vec![101]);
        // No assignment delta, so the revision stays put.
        assert_eq!(state.assignment_revision, 0);
    }

    #[test]
    fn drain_bumps_revision_once_per_nonempty_drain() {
        let mut state = state_with_group(1);
        add_online_proxy(&mut state, 1, 11);

        let group = state.groups.get_mut(&1).unwrap();
        group.host_ids = vec![101, 102];
        group.new_host_ids = vec![101, 102];
        state.queue_group_update(1);

        let drained = state.drain_updates();
        assert_eq!(state.assignment_revision, 1);
        assert!(drained.new.iter().all(|a| a.revision == 1));

        // A drain with no deltas must not advance the revision.
        state.queue_group_update(1);
        state.drain_updates();
        assert_eq!(state.assignment_revision, 1);
    }

    #[test]
    fn drain_reports_dirty_flags_and_clears_them() {
        let mut state = state_with_group(1);
        let group = state.groups.get_mut(&1).unwrap();
        group.status = GroupStatus::Online;
        group.status_dirty = true;
        state.queue_group_update(1);

        let drained = state.drain_updates();
        assert_eq!(drained.groups.len(), 1);
        assert!(drained.groups[0].status_changed);
        assert!(!drained.groups[0].assignments_changed);
        assert_eq!(drained.groups[0].status, GroupStatus::Online);

        assert!(!state.groups[&1].status_dirty);
        assert!(!state.has_pending_updates());
    }

    #[test]
    fn relocation_queue_drains_whole() {
        let mut state = state_with_group(1);
        state.queue_relocation(RelocationEvent { proxy_id: 11, src: None, dst: Some(1) });
        state.queue_relocation(RelocationEvent { proxy_id: 12, src: Some(1), dst: None });

        assert!(state.has_relocations());
        let events = state.take_relocations();
        assert_eq!(events.len(), 2);
        assert!(!state.has_relocations());
    }
}
