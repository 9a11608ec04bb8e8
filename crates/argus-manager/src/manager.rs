//! The proxy group manager and its control loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

use argus_cache::{Cache, CacheState};
use argus_confcache::ConfCache;
use argus_store::{MonitorStore, StoreResult};

use crate::bootstrap::load_cache;
use crate::evaluator::evaluate_status;
use crate::flusher::flush_updates;
use crate::relocation::apply_relocations;
use crate::sync::sync_groups;

/// Default interval between group sync + status evaluation passes.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Default control loop tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Owns the cache and runs the manager's control loop.
pub struct GroupManager {
    cache: Arc<Cache>,
    confcache: Arc<ConfCache>,
    store: MonitorStore,
    status_interval: Duration,
    tick_interval: Duration,
}

impl GroupManager {
    /// Create the manager, restoring the persisted assignment revision.
    pub fn new(store: MonitorStore, confcache: Arc<ConfCache>) -> StoreResult<Self> {
        Self::with_intervals(store, confcache, DEFAULT_STATUS_INTERVAL, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_intervals(
        store: MonitorStore,
        confcache: Arc<ConfCache>,
        status_interval: Duration,
        tick_interval: Duration,
    ) -> StoreResult<Self> {
        let revision = store.load_assignment_revision()?;
        let cache = Arc::new(Cache::new(CacheState::new(revision, epoch_secs())));
        Ok(Self {
            cache,
            confcache,
            store,
            status_interval,
            tick_interval,
        })
    }

    /// Shared handle to the cache, for the diagnostic service.
    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(&self.cache)
    }

    /// Populate the cache from the configuration cache and the store.
    pub async fn bootstrap(&self) -> StoreResult<()> {
        let mut state = self.cache.lock().await;
        load_cache(&mut state, &self.confcache, &self.store)
    }

    /// Run the control loop until shutdown is signalled.
    ///
    /// Each tick: group sync and status evaluation on the status
    /// interval, relocation handling when events are pending, and a
    /// flush pass when updates are pending.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            status_interval_secs = self.status_interval.as_secs(),
            "proxy group manager started"
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        // No pass recorded yet, so the first tick runs one immediately.
        let mut last_status: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if last_status.is_none_or(|t| t.elapsed() >= self.status_interval) {
                        {
                            let mut state = self.cache.lock().await;
                            sync_groups(&mut state, &self.confcache);
                            evaluate_status(
                                &mut state,
                                &self.confcache,
                                epoch_secs(),
                                self.status_interval.as_secs(),
                            );
                        }
                        last_status = Some(Instant::now());
                    }

                    apply_relocations(&self.cache, &self.store).await;

                    if let Err(e) = flush_updates(&self.cache, &self.store, &self.confcache).await {
                        // Transient failures are retried inside the
                        // flush; anything surfacing here is a data
                        // error the store rejected.
                        error!(error = %e, "flush pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("proxy group manager shutting down");
                    break;
                }
            }
        }
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_confcache::GroupConfig;
    use argus_store::{GroupStatus, HostRow, ProxyRow, RtdataRow};

    fn seeded_world() -> (MonitorStore, Arc<ConfCache>) {
        let store = MonitorStore::open_in_memory().unwrap();
        let confcache = Arc::new(ConfCache::new());
        confcache.put_group(GroupConfig {
            group_id: 1,
            min_online: 1,
            failover_delay: 3600,
        });

        let now = epoch_secs();
        store.put_host(&HostRow { host_id: 101, group_id: 1 }).unwrap();
        store
            .put_proxy(&ProxyRow {
                proxy_id: 11,
                group_id: 1,
                name: "edge-a".to_string(),
            })
            .unwrap();
        store.put_rtdata(&RtdataRow { proxy_id: 11, lastaccess: now }).unwrap();
        confcache.set_lastaccess(11, now);

        (store, confcache)
    }

    #[tokio::test]
    async fn manager_restores_persisted_revision() {
        let store = MonitorStore::open_in_memory().unwrap();
        let mut txn = store.begin_flush().unwrap();
        txn.put_assignment_revision(42).unwrap();
        txn.commit().unwrap();

        let manager = GroupManager::new(store, Arc::new(ConfCache::new())).unwrap();
        assert_eq!(manager.cache().lock().await.assignment_revision, 42);
    }

    #[tokio::test]
    async fn loop_assigns_hosts_and_brings_group_online() {
        let (store, confcache) = seeded_world();
        let manager = GroupManager::with_intervals(
            store.clone(),
            confcache,
            Duration::from_millis(20),
            Duration::from_millis(10),
        )
        .unwrap();
        manager.bootstrap().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cache = manager.cache();
        let run = tokio::spawn(async move { manager.run(shutdown_rx).await });

        // Wait for the first flush to land in the store.
        let mut assigned = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assigned = store.load_assignments().unwrap();
            if !assigned.is_empty() {
                break;
            }
        }

        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].host_id, 101);
        assert_eq!(assigned[0].proxy_id, 11);
        assert_eq!(store.load_assignment_revision().unwrap(), 1);
        assert_eq!(store.get_group_status(1).unwrap(), Some(GroupStatus::Online));
        assert_eq!(cache.lock().await.groups[&1].status, GroupStatus::Online);

        shutdown_tx.send(true).unwrap();
        run.await.unwrap();
    }
}
