//! Persistence flushing — drains cache deltas and commits them to the
//! store as one transaction.
//!
//! A pass is all-or-nothing: on a transient store failure the whole
//! transaction is retried until it commits, so updates are never
//! partially applied. After a successful commit the new assignment
//! revision is published to the configuration cache, scoped to the
//! groups whose host mapping structurally changed.

use std::time::Duration;

use tracing::{debug, warn};

use argus_cache::{Cache, DrainedUpdates};
use argus_confcache::ConfCache;
use argus_store::{FlushStats, GroupId, GroupStatus, MonitorStore, StoreResult};

/// Delay between retries while the store is unavailable.
const FLUSH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Run one flush pass. No-op when nothing is pending.
pub async fn flush_updates(
    cache: &Cache,
    store: &MonitorStore,
    confcache: &ConfCache,
) -> StoreResult<()> {
    let (drained, revision) = {
        let mut state = cache.lock().await;
        if !state.has_pending_updates() {
            return Ok(());
        }
        let drained = state.drain_updates();
        (drained, state.assignment_revision)
    };

    if drained.is_empty() {
        return Ok(());
    }

    let stats = loop {
        match commit_flush(store, &drained, revision) {
            Ok(stats) => break stats,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "store unavailable, retrying flush");
                tokio::time::sleep(FLUSH_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    };

    let changed_groups: Vec<GroupId> = drained
        .groups
        .iter()
        .filter(|g| g.assignments_changed)
        .map(|g| g.group_id)
        .collect();
    confcache.update_group_hpmap_revision(&changed_groups, revision);

    debug!(?stats, revision, "flush pass committed");
    Ok(())
}

/// One whole store transaction covering every flush step.
fn commit_flush(
    store: &MonitorStore,
    drained: &DrainedUpdates,
    revision: u64,
) -> StoreResult<FlushStats> {
    let status_updates: Vec<(GroupId, GroupStatus)> = drained
        .groups
        .iter()
        .filter(|g| g.status_changed)
        .map(|g| (g.group_id, g.status))
        .collect();

    let mut txn = store.begin_flush()?;
    txn.update_group_statuses(&status_updates)?;
    txn.update_assignments(&drained.modified)?;
    txn.delete_assignments(&drained.deleted)?;
    txn.insert_assignments(&drained.new)?;
    txn.put_assignment_revision(revision)?;
    txn.commit()
}
