//! Bootstrap — populates the cache from the store at startup.
//!
//! Groups come from the configuration cache; host memberships, proxies
//! and assignments come from the store. Rows referencing unknown groups
//! or proxies are invariant violations: they are logged and skipped,
//! and the cache continues in degraded-consistency mode.

use tracing::{debug, warn};

use argus_cache::CacheState;
use argus_confcache::ConfCache;
use argus_store::{MonitorStore, ProxyStatus, StoreResult};

use crate::sync::sync_groups;

/// Load the fleet into an empty cache. Called once, before the control
/// loop starts.
pub fn load_cache(
    state: &mut CacheState,
    confcache: &ConfCache,
    store: &MonitorStore,
) -> StoreResult<()> {
    sync_groups(state, confcache);
    load_hosts(state, store)?;
    load_proxies(state, store)?;
    load_assignments(state, store)?;
    queue_unmapped_hosts(state);

    debug!(
        groups = state.groups.len(),
        proxies = state.proxies.len(),
        assignments = state.assignments.len(),
        "cache bootstrapped"
    );
    Ok(())
}

/// Attach host memberships to their groups.
fn load_hosts(state: &mut CacheState, store: &MonitorStore) -> StoreResult<()> {
    for host in store.load_hosts()? {
        let Some(group) = state.groups.get_mut(&host.group_id) else {
            warn!(
                host_id = host.host_id,
                group_id = host.group_id,
                "host references unknown group, skipping"
            );
            continue;
        };
        group.host_ids.push(host.host_id);
    }
    Ok(())
}

/// Load proxies and estimate their initial status.
///
/// There is no live clock reference for data written before a restart,
/// so the highest loaded heartbeat serves as the reference timestamp:
/// proxies within one failover delay of it start online.
fn load_proxies(state: &mut CacheState, store: &MonitorStore) -> StoreResult<()> {
    let rows = store.load_proxies()?;

    let clock = rows.iter().map(|(_, lastaccess)| *lastaccess).max().unwrap_or(0);

    for (row, lastaccess) in rows {
        let Some(group) = state.groups.get(&row.group_id) else {
            warn!(
                proxy_id = row.proxy_id,
                group_id = row.group_id,
                "proxy references unknown group, skipping"
            );
            continue;
        };
        let failover_delay = group.failover_delay;

        let Some(proxy) = state.group_add_proxy(row.group_id, row.proxy_id, &row.name, lastaccess)
        else {
            continue;
        };
        proxy.status = if clock.saturating_sub(lastaccess) >= failover_delay {
            ProxyStatus::Offline
        } else {
            ProxyStatus::Online
        };
    }
    Ok(())
}

/// Load host assignments, attaching them to their proxies.
fn load_assignments(state: &mut CacheState, store: &MonitorStore) -> StoreResult<()> {
    for assignment in store.load_assignments()? {
        if !state.proxies.contains_key(&assignment.proxy_id) {
            // The serving proxy is gone; the row is queued for deletion
            // and the host re-assigned through the normal flush path.
            state.queue_assignment_delete(assignment.host_id);
            continue;
        }

        state.assignments.insert(assignment.host_id, assignment);
        if let Some(proxy) = state.proxies.get_mut(&assignment.proxy_id) {
            proxy.host_ids.push(assignment.host_id);
            // Proxies holding assignments were most likely online
            // before the restart.
            proxy.status = ProxyStatus::Online;
        }
    }
    Ok(())
}

/// Queue hosts without an assignment into their group's unassigned list.
fn queue_unmapped_hosts(state: &mut CacheState) {
    let assignments = &state.assignments;
    for group in state.groups.values_mut() {
        for &host_id in &group.host_ids {
            if !assignments.contains_key(&host_id) {
                group.new_host_ids.push(host_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_confcache::GroupConfig;
    use argus_store::{HostAssignment, HostRow, ProxyRow, RtdataRow};

    fn seeded_confcache() -> ConfCache {
        let confcache = ConfCache::new();
        confcache.put_group(GroupConfig {
            group_id: 1,
            min_online: 1,
            failover_delay: 60,
        });
        confcache
    }

    fn put_proxy(store: &MonitorStore, proxy_id: u64, lastaccess: u64) {
        store
            .put_proxy(&ProxyRow {
                proxy_id,
                group_id: 1,
                name: format!("edge-{proxy_id}"),
            })
            .unwrap();
        store.put_rtdata(&RtdataRow { proxy_id, lastaccess }).unwrap();
    }

    #[test]
    fn loads_groups_hosts_proxies_and_assignments() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();
        store.put_host(&HostRow { host_id: 101, group_id: 1 }).unwrap();
        put_proxy(&store, 11, 5000);
        store
            .put_assignment(&HostAssignment { host_id: 101, proxy_id: 11, revision: 3 })
            .unwrap();

        let mut state = CacheState::new(3, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert_eq!(state.groups[&1].host_ids, vec![101]);
        assert_eq!(state.groups[&1].proxy_ids, vec![11]);
        assert_eq!(state.proxies[&11].host_ids, vec![101]);
        assert_eq!(state.proxies[&11].status, ProxyStatus::Online);
        assert_eq!(state.assignments[&101].revision, 3);
        assert!(state.groups[&1].new_host_ids.is_empty());
    }

    #[test]
    fn host_with_unknown_group_is_skipped() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();
        store.put_host(&HostRow { host_id: 101, group_id: 1 }).unwrap();
        store.put_host(&HostRow { host_id: 102, group_id: 99 }).unwrap();

        let mut state = CacheState::new(0, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert_eq!(state.groups[&1].host_ids, vec![101]);
        assert_eq!(state.groups.len(), 1);
    }

    #[test]
    fn proxy_status_is_estimated_from_highest_heartbeat() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();
        // Proxy 12's heartbeat is a full failover delay behind 11's.
        put_proxy(&store, 11, 5000);
        put_proxy(&store, 12, 4940);

        let mut state = CacheState::new(0, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert_eq!(state.proxies[&11].status, ProxyStatus::Online);
        assert_eq!(state.proxies[&12].status, ProxyStatus::Offline);
    }

    #[test]
    fn assignment_with_unknown_proxy_is_queued_for_deletion() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();
        store.put_host(&HostRow { host_id: 101, group_id: 1 }).unwrap();
        store
            .put_assignment(&HostAssignment { host_id: 101, proxy_id: 99, revision: 1 })
            .unwrap();

        let mut state = CacheState::new(1, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert!(state.assignments.is_empty());
        // The orphaned row flushes as a delete, and the host is queued
        // for a fresh assignment.
        assert!(state.has_pending_updates());
        assert_eq!(state.groups[&1].new_host_ids, vec![101]);
    }

    #[test]
    fn unmapped_hosts_are_queued_for_assignment() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();
        store.put_host(&HostRow { host_id: 101, group_id: 1 }).unwrap();
        store.put_host(&HostRow { host_id: 102, group_id: 1 }).unwrap();
        put_proxy(&store, 11, 5000);
        store
            .put_assignment(&HostAssignment { host_id: 101, proxy_id: 11, revision: 1 })
            .unwrap();

        let mut state = CacheState::new(1, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert_eq!(state.groups[&1].new_host_ids, vec![102]);
    }

    #[test]
    fn bootstrap_queues_every_group_for_a_first_pass() {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = seeded_confcache();

        let mut state = CacheState::new(0, 1000);
        load_cache(&mut state, &confcache, &store).unwrap();

        assert_eq!(state.queued_group_ids(), vec![1]);
    }
}
