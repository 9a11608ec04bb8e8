//! Diagnostic service — answers cache snapshot and statistics queries
//! over an in-process request/response channel.
//!
//! Initialization is the manager's only fatal startup case: the daemon
//! cannot run without its service handle.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use argus_cache::Cache;
use argus_store::{GroupId, GroupStatus};

use crate::error::{ManagerError, ManagerResult};

/// Point-in-time view of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub group_id: GroupId,
    pub status: GroupStatus,
    pub proxies: usize,
    pub hosts: usize,
    pub unassigned_hosts: usize,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub groups: usize,
    pub proxies: usize,
    pub assignments: usize,
    pub assignment_revision: u64,
}

enum ServiceRequest {
    Snapshot(oneshot::Sender<Vec<GroupSnapshot>>),
    Stats(oneshot::Sender<CacheStats>),
}

/// Handle to the manager's diagnostic service.
#[derive(Clone)]
pub struct ManagerService {
    tx: mpsc::Sender<ServiceRequest>,
}

impl ManagerService {
    /// Start the service task. Fails when no async runtime is available
    /// to host it.
    pub fn init(cache: Arc<Cache>) -> ManagerResult<(Self, JoinHandle<()>)> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ManagerError::ServiceInit(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel::<ServiceRequest>(32);

        let task = handle.spawn(async move {
            while let Some(request) = rx.recv().await {
                let state = cache.lock().await;
                match request {
                    ServiceRequest::Snapshot(reply) => {
                        let mut groups: Vec<GroupSnapshot> = state
                            .groups
                            .values()
                            .map(|g| GroupSnapshot {
                                group_id: g.id,
                                status: g.status,
                                proxies: g.proxy_ids.len(),
                                hosts: g.host_ids.len(),
                                unassigned_hosts: g.new_host_ids.len(),
                            })
                            .collect();
                        groups.sort_by_key(|g| g.group_id);
                        let _ = reply.send(groups);
                    }
                    ServiceRequest::Stats(reply) => {
                        let _ = reply.send(CacheStats {
                            groups: state.groups.len(),
                            proxies: state.proxies.len(),
                            assignments: state.assignments.len(),
                            assignment_revision: state.assignment_revision,
                        });
                    }
                }
            }
            debug!("manager service stopped");
        });

        info!("proxy group manager service started");
        Ok((Self { tx }, task))
    }

    /// Per-group snapshot of the cache.
    pub async fn snapshot(&self) -> ManagerResult<Vec<GroupSnapshot>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceRequest::Snapshot(reply_tx))
            .await
            .map_err(|e| ManagerError::Service(e.to_string()))?;
        reply_rx
            .await
            .map_err(|e| ManagerError::Service(e.to_string()))
    }

    /// Aggregate cache statistics.
    pub async fn stats(&self) -> ManagerResult<CacheStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ServiceRequest::Stats(reply_tx))
            .await
            .map_err(|e| ManagerError::Service(e.to_string()))?;
        reply_rx
            .await
            .map_err(|e| ManagerError::Service(e.to_string()))
    }
}
