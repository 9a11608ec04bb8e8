//! MonitorStore — redb-backed persistence for the proxy group manager.
//!
//! Provides typed reads for bootstrap (groups, hosts, proxies, runtime
//! data, assignments), the ordered proxy-name query used during
//! relocation, and write access for the surrounding platform that owns
//! the host and proxy tables. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::flush::FlushTxn;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

pub(crate) use map_err;

/// Thread-safe monitoring store backed by redb.
#[derive(Clone)]
pub struct MonitorStore {
    db: Arc<Database>,
}

impl MonitorStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "monitoring store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory monitoring store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROXY_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(PROXIES).map_err(map_err!(Table))?;
        txn.open_table(PROXY_RTDATA).map_err(map_err!(Table))?;
        txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.open_table(IDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    // ── Platform writes ────────────────────────────────────────────
    //
    // The host and proxy tables are owned by the wider platform; these
    // writers exist for bootstrap seeding and tests.

    /// Insert or update a host row.
    pub fn put_host(&self, host: &HostRow) -> StoreResult<()> {
        self.put_row(HOSTS, host.host_id, host)
    }

    /// Insert or update a proxy definition.
    pub fn put_proxy(&self, proxy: &ProxyRow) -> StoreResult<()> {
        self.put_row(PROXIES, proxy.proxy_id, proxy)
    }

    /// Insert or update a proxy's runtime data.
    pub fn put_rtdata(&self, rtdata: &RtdataRow) -> StoreResult<()> {
        self.put_row(PROXY_RTDATA, rtdata.proxy_id, rtdata)
    }

    /// Insert or update a host assignment outside a flush pass.
    pub fn put_assignment(&self, assignment: &HostAssignment) -> StoreResult<()> {
        self.put_row(ASSIGNMENTS, assignment.host_id, assignment)
    }

    /// Delete a host row. Returns true if it existed.
    pub fn delete_host(&self, host_id: HostId) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let existed;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            existed = table.remove(host_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(existed)
    }

    /// Delete a proxy definition. Returns true if it existed.
    pub fn delete_proxy(&self, proxy_id: ProxyId) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        let existed;
        {
            let mut table = txn.open_table(PROXIES).map_err(map_err!(Table))?;
            existed = table.remove(proxy_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(existed)
    }

    fn put_row<T: serde::Serialize>(
        &self,
        def: redb::TableDefinition<u64, &[u8]>,
        key: u64,
        row: &T,
    ) -> StoreResult<()> {
        let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Unavailable))?;
        Ok(())
    }

    // ── Bootstrap reads ────────────────────────────────────────────

    /// Read the persisted assignment revision, or 0 if never written.
    pub fn load_assignment_revision(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(IDS).map_err(map_err!(Table))?;
        match table.get(ASSIGNMENT_REVISION_KEY).map_err(map_err!(Read))? {
            Some(guard) => Ok(guard.value()),
            None => Ok(0),
        }
    }

    /// Read the persisted status of a single group.
    pub fn get_group_status(&self, group_id: GroupId) -> StoreResult<Option<GroupStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(PROXY_GROUPS).map_err(map_err!(Table))?;
        match table.get(group_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let row: ProxyGroupRow =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row.status))
            }
            None => Ok(None),
        }
    }

    /// List all hosts with a group membership.
    pub fn load_hosts(&self) -> StoreResult<Vec<HostRow>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: HostRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(row);
        }
        Ok(results)
    }

    /// List all proxies joined with their runtime data.
    ///
    /// Returns `(row, lastaccess)` pairs; proxies without a runtime data
    /// record get `lastaccess = 0`.
    pub fn load_proxies(&self) -> StoreResult<Vec<(ProxyRow, u64)>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let proxies = txn.open_table(PROXIES).map_err(map_err!(Table))?;
        let rtdata = txn.open_table(PROXY_RTDATA).map_err(map_err!(Table))?;

        let mut results = Vec::new();
        for entry in proxies.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let row: ProxyRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            let lastaccess = match rtdata.get(key.value()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let rt: RtdataRow =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    rt.lastaccess
                }
                None => 0,
            };
            results.push((row, lastaccess));
        }
        Ok(results)
    }

    /// List all host-proxy assignments.
    pub fn load_assignments(&self) -> StoreResult<Vec<HostAssignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: HostAssignment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(row);
        }
        Ok(results)
    }

    // ── Relocation support ─────────────────────────────────────────

    /// Resolve display names for the given proxy ids in one ordered scan.
    ///
    /// `proxy_ids` must be sorted and de-duplicated; the result is the
    /// merge-join of the id list against the proxy table in id order.
    /// Ids without a matching row are simply absent from the result.
    pub fn fetch_proxy_names(&self, proxy_ids: &[ProxyId]) -> StoreResult<Vec<(ProxyId, String)>> {
        let (Some(&first), Some(&last)) = (proxy_ids.first(), proxy_ids.last()) else {
            return Ok(Vec::new());
        };

        let txn = self.db.begin_read().map_err(map_err!(Unavailable))?;
        let table = txn.open_table(PROXIES).map_err(map_err!(Table))?;

        let mut names = Vec::new();
        let mut i = 0;
        for entry in table.range(first..=last).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let proxy_id = key.value();

            while i < proxy_ids.len() && proxy_ids[i] < proxy_id {
                i += 1;
            }
            if i == proxy_ids.len() {
                break;
            }
            if proxy_ids[i] != proxy_id {
                continue;
            }

            let row: ProxyRow =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            names.push((proxy_id, row.name));
            i += 1;
        }
        Ok(names)
    }

    // ── Flush ──────────────────────────────────────────────────────

    /// Begin a flush transaction covering one whole persistence pass.
    pub fn begin_flush(&self) -> StoreResult<FlushTxn> {
        let txn = self.db.begin_write().map_err(map_err!(Unavailable))?;
        Ok(FlushTxn::new(txn))
    }
}
