//! Flush transaction — one write transaction per persistence pass.
//!
//! A [`FlushTxn`] wraps a single redb write transaction and carries every
//! step of a flush: group status updates, assignment updates/deletes,
//! validated batch inserts and the revision upsert. Nothing is visible to
//! readers until [`FlushTxn::commit`] succeeds, so a pass is applied
//! whole or not at all. The write transaction is exclusive, which gives
//! the existence checks before inserts the same guarantee a relational
//! store gets from row-locking reads.

use std::collections::HashSet;

use redb::{ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::map_err;
use crate::tables::*;
use crate::types::*;

/// Rows per insert batch.
pub const INSERT_BATCH_SIZE: usize = 1000;

/// Counters accumulated across one flush transaction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub groups_updated: u32,
    pub assignments_updated: u32,
    pub assignments_deleted: u32,
    pub assignments_inserted: u32,
    pub assignments_skipped: u32,
    pub insert_batches: u32,
}

/// A single flush pass against the store.
pub struct FlushTxn {
    txn: WriteTransaction,
    stats: FlushStats,
}

impl FlushTxn {
    pub(crate) fn new(txn: WriteTransaction) -> Self {
        Self {
            txn,
            stats: FlushStats::default(),
        }
    }

    /// Batched status update for dirty groups.
    pub fn update_group_statuses(
        &mut self,
        updates: &[(GroupId, GroupStatus)],
    ) -> StoreResult<()> {
        let mut table = self.txn.open_table(PROXY_GROUPS).map_err(map_err!(Table))?;
        for &(group_id, status) in updates {
            let row = ProxyGroupRow { group_id, status };
            let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
            table.insert(group_id, value.as_slice()).map_err(map_err!(Write))?;
            self.stats.groups_updated += 1;
        }
        Ok(())
    }

    /// Batched update of modified assignments (proxy id + revision by host id).
    pub fn update_assignments(&mut self, rows: &[HostAssignment]) -> StoreResult<()> {
        let mut table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        for row in rows {
            let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
            table.insert(row.host_id, value.as_slice()).map_err(map_err!(Write))?;
            self.stats.assignments_updated += 1;
        }
        Ok(())
    }

    /// Batched delete over the sorted, de-duplicated host id set.
    pub fn delete_assignments(&mut self, host_ids: &[HostId]) -> StoreResult<()> {
        if host_ids.is_empty() {
            return Ok(());
        }

        let mut ids = host_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        for host_id in ids {
            if table.remove(host_id).map_err(map_err!(Write))?.is_some() {
                self.stats.assignments_deleted += 1;
            }
        }
        Ok(())
    }

    /// Insert new assignments in fixed-size batches.
    ///
    /// Each batch re-validates that the referenced host and proxy rows
    /// still exist before inserting; rows that fail the check are skipped
    /// silently so an assignment can never outlive its endpoints.
    pub fn insert_assignments(&mut self, rows: &[HostAssignment]) -> StoreResult<()> {
        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            self.insert_assignment_batch(batch)?;
            self.stats.insert_batches += 1;
        }
        Ok(())
    }

    fn insert_assignment_batch(&mut self, batch: &[HostAssignment]) -> StoreResult<()> {
        let host_index = self.existing_ids(HOSTS, batch.iter().map(|r| r.host_id))?;
        let proxy_index = self.existing_ids(PROXIES, batch.iter().map(|r| r.proxy_id))?;

        let mut table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        for row in batch {
            if !host_index.contains(&row.host_id) || !proxy_index.contains(&row.proxy_id) {
                debug!(
                    host_id = row.host_id,
                    proxy_id = row.proxy_id,
                    "skipping assignment for missing host or proxy"
                );
                self.stats.assignments_skipped += 1;
                continue;
            }

            let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
            table.insert(row.host_id, value.as_slice()).map_err(map_err!(Write))?;
            self.stats.assignments_inserted += 1;
        }
        Ok(())
    }

    /// Look up which of the given ids exist in a table.
    fn existing_ids(
        &self,
        def: redb::TableDefinition<u64, &[u8]>,
        ids: impl Iterator<Item = u64>,
    ) -> StoreResult<HashSet<u64>> {
        let mut wanted: Vec<u64> = ids.collect();
        wanted.sort_unstable();
        wanted.dedup();

        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let mut found = HashSet::with_capacity(wanted.len());
        for id in wanted {
            if table.get(id).map_err(map_err!(Read))?.is_some() {
                found.insert(id);
            }
        }
        Ok(found)
    }

    /// Persist the global assignment revision (insert-if-absent, else update).
    pub fn put_assignment_revision(&mut self, revision: u64) -> StoreResult<()> {
        let mut table = self.txn.open_table(IDS).map_err(map_err!(Table))?;
        table
            .insert(ASSIGNMENT_REVISION_KEY, revision)
            .map_err(map_err!(Write))?;
        Ok(())
    }

    /// Commit the whole pass. On failure nothing was applied.
    pub fn commit(self) -> StoreResult<FlushStats> {
        let stats = self.stats;
        self.txn
            .commit()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        debug!(?stats, "flush transaction committed");
        Ok(stats)
    }
}
