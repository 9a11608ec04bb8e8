//! Group sync — reconciles group existence and revisions from the
//! configuration cache into the manager's cache.

use tracing::{debug, warn};

use argus_cache::CacheState;
use argus_confcache::ConfCache;
use argus_store::GroupId;

/// Merge the upstream group set into the cache.
///
/// Groups no longer present upstream (`sync_revision == 0`) are removed
/// together with their member lists — destructive and unrecoverable.
/// Groups whose revision advanced past the previously recorded one are
/// queued for a status/persistence pass. Revisions are compared with
/// `>=`; an unchanged upstream set is a no-op.
pub fn sync_groups(state: &mut CacheState, confcache: &ConfCache) {
    let old_revision = state.group_revision;
    let Some(new_revision) = confcache.get_proxy_groups(&mut state.groups, old_revision) else {
        return;
    };
    state.group_revision = new_revision;

    let removed: Vec<GroupId> = state
        .groups
        .values()
        .filter(|g| g.sync_revision == 0)
        .map(|g| g.id)
        .collect();
    for group_id in removed {
        warn!(group_id, "group no longer exists upstream, removing");
        state.remove_group(group_id);
    }

    let changed: Vec<GroupId> = state
        .groups
        .values()
        .filter(|g| g.revision > old_revision)
        .map(|g| g.id)
        .collect();
    for group_id in changed {
        debug!(group_id, "group configuration changed, queued for update");
        state.queue_group_update(group_id);
    }
}
