//! Pool membership and job-existence replication.
//!
//! Every write here is best-effort per node: a node that cannot be reached
//! is logged and skipped, and the outcome is summarised in a
//! `ReplicationReport`.

use std::collections::HashSet;

use futures::future::join_all;
use qluster_core::{JobRecord, KeySpace, NodeAddress, QueueError, QueueResult};
use qluster_infrastructure::ConnectionPool;
use tracing::{debug, warn};

/// Which nodes a replicated write reached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicationReport {
    pub succeeded: Vec<NodeAddress>,
    pub failed: Vec<(NodeAddress, String)>,
}

impl ReplicationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn reached(&self, node: &NodeAddress) -> bool {
        self.succeeded.contains(node)
    }

    /// Fold per-node outcomes into a report. Connections to nodes that
    /// failed are evicted so the next write reconnects.
    async fn collect(
        connections: &ConnectionPool,
        operation: &str,
        outcomes: Vec<(NodeAddress, QueueResult<()>)>,
    ) -> Self {
        let mut report = Self::default();
        for (node, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(node),
                Err(e) => {
                    warn!("Replication {} to {} failed: {}", operation, node, e);
                    connections.evict(&node).await;
                    report.failed.push((node, e.to_string()));
                }
            }
        }
        report
    }
}

/// Deduplicate a pool while keeping its order.
pub fn normalize_pool(pool: &[NodeAddress]) -> Vec<NodeAddress> {
    let mut members: Vec<NodeAddress> = Vec::with_capacity(pool.len());
    for node in pool {
        if !members.contains(node) {
            members.push(node.clone());
        }
    }
    members
}

/// Parse the members of a pool set, skipping entries that are not
/// `host:port`. The result is sorted so reads are stable.
pub fn parse_pool(members: HashSet<String>) -> Vec<NodeAddress> {
    let mut pool: Vec<NodeAddress> = members
        .into_iter()
        .filter_map(|entry| match entry.parse::<NodeAddress>() {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("Ignoring pool entry {:?}: {}", entry, e);
                None
            }
        })
        .collect();
    pool.sort_by_key(|node| node.to_string());
    pool
}

/// Write the whole pool into every member's membership set.
pub async fn update_pool(
    connections: &ConnectionPool,
    keys: &KeySpace,
    pool: &[NodeAddress],
) -> ReplicationReport {
    let entries: Vec<String> = pool.iter().map(NodeAddress::to_string).collect();
    let outcomes = join_all(pool.iter().map(|node| {
        let entries = &entries;
        async move {
            let outcome = async {
                let client = connections.get(node).await?;
                for entry in entries {
                    client.add_member(&keys.pool(), entry).await?;
                }
                Ok::<(), QueueError>(())
            }
            .await;
            (node.clone(), outcome)
        }
    }))
    .await;

    ReplicationReport::collect(connections, "pool membership", outcomes).await
}

/// Copy the job's record and global listings to every node in `pool`.
pub async fn distribute_job(
    connections: &ConnectionPool,
    keys: &KeySpace,
    job_id: &str,
    record: &JobRecord,
    pool: &[NodeAddress],
) -> QueueResult<ReplicationReport> {
    let fields = record.to_fields()?;
    let level = record.priority_level();
    let outcomes = join_all(pool.iter().map(|node| {
        let fields = &fields;
        async move {
            let outcome = async {
                let client = connections.get(node).await?;
                client.add_scored(&keys.jobs(), job_id, level).await?;
                client.set_fields(&keys.job(job_id), fields).await?;
                client
                    .add_scored(&keys.owned_jobs(&record.owner), job_id, level)
                    .await?;
                debug!("Replicated job {} to {}", job_id, node);
                Ok::<(), QueueError>(())
            }
            .await;
            (node.clone(), outcome)
        }
    }))
    .await;

    Ok(ReplicationReport::collect(connections, "job data", outcomes).await)
}

/// Delete the job's record and global listings from every node in `pool`.
pub async fn purge_job(
    connections: &ConnectionPool,
    keys: &KeySpace,
    job_id: &str,
    owner: &NodeAddress,
    pool: &[NodeAddress],
) -> ReplicationReport {
    let outcomes = join_all(pool.iter().map(|node| async move {
        let outcome = async {
            let client = connections.get(node).await?;
            client.delete_key(&keys.job(job_id)).await?;
            client.remove_member(&keys.jobs(), job_id).await?;
            client.remove_member(&keys.owned_jobs(owner), job_id).await?;
            debug!("Purged job {} from {}", job_id, node);
            Ok::<(), QueueError>(())
        }
        .await;
        (node.clone(), outcome)
    }))
    .await;

    ReplicationReport::collect(connections, "job removal", outcomes).await
}
