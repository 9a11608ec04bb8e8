//! Relocation handling — applies proxy moves between groups.
//!
//! Destination proxies the cache has never seen need their display name
//! from the store. Those ids are collected under the lock, the lock is
//! released for the one ordered name query, and the events are applied
//! under a re-acquired lock. Events queued while the query runs stay in
//! the cache for the next pass.

use tracing::{debug, warn};

use argus_cache::{Cache, CacheState, RelocationEvent};
use argus_store::{MonitorStore, ProxyId};

/// Consume the relocation queue once.
pub async fn apply_relocations(cache: &Cache, store: &MonitorStore) {
    let (events, mut unknown) = {
        let mut state = cache.lock().await;
        if !state.has_relocations() {
            return;
        }
        let events = state.take_relocations();

        let unknown: Vec<ProxyId> = events
            .iter()
            .filter(|e| e.dst.is_some() && !state.proxies.contains_key(&e.proxy_id))
            .map(|e| e.proxy_id)
            .collect();
        (events, unknown)
    };

    let names = if unknown.is_empty() {
        Vec::new()
    } else {
        unknown.sort_unstable();
        unknown.dedup();
        match store.fetch_proxy_names(&unknown) {
            Ok(names) => names,
            Err(e) => {
                // Non-fatal: unresolved proxies get an empty name.
                warn!(error = %e, "failed to resolve proxy names for relocation");
                Vec::new()
            }
        }
    };

    let mut state = cache.lock().await;
    for event in events {
        apply_one(&mut state, &names, event);
    }
}

fn apply_one(state: &mut CacheState, names: &[(ProxyId, String)], event: RelocationEvent) {
    if let Some(src) = event.src
        && state.groups.contains_key(&src)
    {
        state.group_remove_proxy(src, event.proxy_id);
        // Losing a member can change the source group's health.
        state.queue_group_update(src);
    }

    match event.dst {
        Some(dst) if state.groups.contains_key(&dst) => {
            let name = match names.binary_search_by_key(&event.proxy_id, |(id, _)| *id) {
                Ok(i) => names[i].1.as_str(),
                Err(_) => "",
            };
            state.group_add_proxy(dst, event.proxy_id, name, 0);
            state.queue_group_update(dst);
            debug!(
                proxy_id = event.proxy_id,
                src = ?event.src,
                dst,
                "proxy relocated"
            );
        }
        Some(dst) => {
            warn!(proxy_id = event.proxy_id, dst, "relocation to unknown group skipped");
        }
        None => {
            state.release_proxy(event.proxy_id);
        }
    }
}
