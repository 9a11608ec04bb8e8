//! Status evaluation — per-proxy heartbeat debounce and the per-group
//! hysteresis state machine.
//!
//! A proxy must be silent for a full `failover_delay` before it is
//! declared offline, and must hold a continuous heartbeat streak of the
//! same length before it is trusted online again. Groups never flip
//! from online straight to offline: a serving group first decays, and
//! an offline group first recovers.

use tracing::{debug, info};

use argus_cache::CacheState;
use argus_confcache::ConfCache;
use argus_store::{GroupId, GroupStatus, ProxyStatus};

/// Run one status pass over the cache.
///
/// `now` is the evaluation timestamp and `interval` the fixed check
/// interval in seconds, used as a lookahead margin so a group does not
/// count proxies about to go stale before the next pass. Called with
/// the cache lock held.
pub fn evaluate_status(state: &mut CacheState, confcache: &ConfCache, now: u64, interval: u64) {
    confcache.refresh_group_proxy_lastaccess(&mut state.proxies);

    // Per-proxy pass: a group is re-queued for aggregation only when a
    // member's status actually changes.
    let mut requeue: Vec<GroupId> = Vec::new();
    for proxy in state.proxies.values_mut() {
        let Some(group) = state.groups.get(&proxy.group_id) else {
            continue;
        };

        let mut status = ProxyStatus::Unknown;

        if now.saturating_sub(proxy.lastaccess) >= group.failover_delay {
            // Silent long enough, but make no decision inside the
            // startup grace window.
            if now.saturating_sub(state.startup_time) >= group.failover_delay {
                status = ProxyStatus::Offline;
                proxy.firstaccess = 0;
            }
        } else {
            if proxy.firstaccess == 0 {
                proxy.firstaccess = proxy.lastaccess;
            }
            if now.saturating_sub(proxy.firstaccess) >= group.failover_delay {
                status = ProxyStatus::Online;
            }
        }

        if status == ProxyStatus::Unknown || proxy.status == status {
            continue;
        }

        info!(proxy_id = proxy.id, ?status, "proxy status changed");
        proxy.status = status;
        requeue.push(proxy.group_id);
    }
    for group_id in requeue {
        state.queue_group_update(group_id);
    }

    // Per-group aggregation, once per queued group.
    for group_id in state.queued_group_ids() {
        let Some(group) = state.groups.get(&group_id) else {
            continue;
        };

        let total = group.proxy_ids.len() as u32;
        let mut online = 0u32;
        let mut healthy = 0u32;

        for proxy_id in &group.proxy_ids {
            let Some(proxy) = state.proxies.get(proxy_id) else {
                continue;
            };
            if proxy.status == ProxyStatus::Online {
                online += 1;
                if now.saturating_sub(proxy.lastaccess) + interval < group.failover_delay {
                    healthy += 1;
                }
            }
        }

        let Some(group) = state.groups.get_mut(&group_id) else {
            continue;
        };

        let mut status = group.status;

        match group.status {
            GroupStatus::Unknown | GroupStatus::Online => {
                // An unknown group comes online and is immediately
                // re-evaluated under the online rules.
                status = GroupStatus::Online;
                if healthy < group.min_online {
                    status = GroupStatus::Decay;
                }
            }
            GroupStatus::Offline => {
                if online >= group.min_online {
                    status = GroupStatus::Recovery;
                }
            }
            GroupStatus::Recovery => {
                if healthy < group.min_online {
                    status = GroupStatus::Decay;
                } else if now.saturating_sub(group.status_time) > group.failover_delay
                    || online == total
                {
                    // A stable recovery re-affirms itself.
                    status = GroupStatus::Recovery;
                }
            }
            GroupStatus::Decay => {
                if healthy >= group.min_online {
                    status = GroupStatus::Online;
                } else if online < group.min_online {
                    status = GroupStatus::Offline;
                }
            }
        }

        if status != group.status {
            info!(
                group_id,
                from = ?group.status,
                to = ?status,
                online,
                healthy,
                "group status changed"
            );
            group.status = status;
            group.status_time = now;
            group.status_dirty = true;
        } else {
            debug!(group_id, ?status, online, healthy, "group status unchanged");
        }
    }
}
