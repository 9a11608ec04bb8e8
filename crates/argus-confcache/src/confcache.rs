//! The configuration cache proper.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use argus_cache::{Group, Proxy};
use argus_store::{GroupId, ProxyId};

/// Upstream definition of a proxy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    pub group_id: GroupId,
    /// Minimum healthy proxies required to keep serving.
    pub min_online: u32,
    /// Failover grace period in seconds.
    pub failover_delay: u64,
}

#[derive(Debug, Default)]
struct ConfCacheState {
    /// Group definitions with the structural revision they last changed at.
    groups: HashMap<GroupId, (GroupConfig, u64)>,
    /// Structural revision of the group set; bumped on every definition
    /// change or removal.
    revision: u64,
    /// Latest heartbeat timestamps reported by the proxies.
    lastaccess: HashMap<ProxyId, u64>,
    /// Host-map revision published per group after a flush.
    hpmap_revisions: HashMap<GroupId, u64>,
}

/// Shared configuration cache.
///
/// Methods take `&self`; the short critical sections are guarded by an
/// internal lock.
#[derive(Debug, Default)]
pub struct ConfCache {
    inner: Mutex<ConfCacheState>,
}

impl ConfCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConfCacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Feeder surface ─────────────────────────────────────────────

    /// Insert or update a group definition, advancing the structural
    /// revision.
    pub fn put_group(&self, config: GroupConfig) {
        let mut inner = self.lock();
        inner.revision += 1;
        let revision = inner.revision;
        inner.groups.insert(config.group_id, (config, revision));
        debug!(group_id = config.group_id, revision, "group definition updated");
    }

    /// Remove a group definition, advancing the structural revision.
    pub fn remove_group(&self, group_id: GroupId) {
        let mut inner = self.lock();
        if inner.groups.remove(&group_id).is_some() {
            inner.revision += 1;
            debug!(group_id, revision = inner.revision, "group definition removed");
        }
    }

    /// Record a proxy heartbeat.
    pub fn set_lastaccess(&self, proxy_id: ProxyId, lastaccess: u64) {
        self.lock().lastaccess.insert(proxy_id, lastaccess);
    }

    // ── Manager surface ────────────────────────────────────────────

    /// Merge the upstream group set into the manager's group table.
    ///
    /// Returns `None` when `revision` is still current — nothing is
    /// touched in that case. Otherwise existing groups get their
    /// definition fields and `sync_revision` refreshed, unseen groups
    /// are materialized, groups absent upstream get `sync_revision = 0`
    /// so the caller can remove them, and the new structural revision
    /// is returned.
    pub fn get_proxy_groups(
        &self,
        groups: &mut HashMap<GroupId, Group>,
        revision: u64,
    ) -> Option<u64> {
        let inner = self.lock();
        if revision >= inner.revision {
            return None;
        }

        for (config, def_revision) in inner.groups.values() {
            match groups.entry(config.group_id) {
                Entry::Occupied(mut entry) => {
                    let group = entry.get_mut();
                    group.revision = *def_revision;
                    group.sync_revision = *def_revision;
                    group.min_online = config.min_online;
                    group.failover_delay = config.failover_delay;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Group::new(
                        config.group_id,
                        *def_revision,
                        config.min_online,
                        config.failover_delay,
                    ));
                }
            }
        }

        for (group_id, group) in groups.iter_mut() {
            if !inner.groups.contains_key(group_id) {
                group.sync_revision = 0;
            }
        }

        Some(inner.revision)
    }

    /// Refresh `lastaccess` on the given proxies from the heartbeat feed.
    ///
    /// Proxies without a recorded heartbeat keep their current value.
    pub fn refresh_group_proxy_lastaccess(&self, proxies: &mut HashMap<ProxyId, Proxy>) {
        let inner = self.lock();
        for (proxy_id, proxy) in proxies.iter_mut() {
            if let Some(&lastaccess) = inner.lastaccess.get(proxy_id) {
                proxy.lastaccess = lastaccess;
            }
        }
    }

    /// Publish the host-map revision for the groups whose mapping
    /// changed in the last flush.
    pub fn update_group_hpmap_revision(&self, group_ids: &[GroupId], revision: u64) {
        let mut inner = self.lock();
        for &group_id in group_ids {
            inner.hpmap_revisions.insert(group_id, revision);
        }
    }

    /// The published host-map revision for a group, if any.
    pub fn group_hpmap_revision(&self, group_id: GroupId) -> Option<u64> {
        self.lock().hpmap_revisions.get(&group_id).copied()
    }

    /// Current structural revision of the group set.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }
}
