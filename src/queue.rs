//! Producer and worker entry points.

use std::sync::Arc;

use qluster_core::{
    Clock, JobOptions, JobRecord, KeySpace, NodeAddress, QueueConfig, QueueError, QueueResult,
    StoreConnector, SystemClock,
};
use qluster_infrastructure::{ConnectionPool, RedisConnector};
use rand::seq::IndexedRandom;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::index;
use crate::job::{load_record, Job};
use crate::lease;
use crate::replication::{distribute_job, normalize_pool, parse_pool, update_pool};

/// State shared by a queue and every job handle it hands out.
pub(crate) struct QueueContext {
    pub(crate) connections: ConnectionPool,
    pub(crate) keys: KeySpace,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Job queue over a pool of store nodes.
pub struct JobQueue {
    config: QueueConfig,
    ctx: Arc<QueueContext>,
}

impl JobQueue {
    pub fn new(config: QueueConfig, connector: Arc<dyn StoreConnector>) -> QueueResult<Self> {
        Self::with_clock(config, connector, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: QueueConfig,
        connector: Arc<dyn StoreConnector>,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        config
            .validate()
            .map_err(|e| QueueError::Configuration(format!("{e:#}")))?;
        let ctx = QueueContext {
            connections: ConnectionPool::new(connector),
            keys: config.key_space(),
            clock,
        };
        Ok(Self {
            config,
            ctx: Arc::new(ctx),
        })
    }

    /// Queue backed by Redis nodes, using the connection settings in `config`.
    pub fn redis(config: QueueConfig) -> QueueResult<Self> {
        let connector = RedisConnector::new(config.redis.clone());
        Self::new(config, Arc::new(connector))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.ctx.keys
    }

    /// Create a job, replicate it across `pool` and activate it on its owner.
    ///
    /// The owner is `assign` when given, otherwise a random pool member.
    /// Replication to non-owner nodes is best-effort; failing to activate on
    /// the owner is an error. Returns the new job id and its owner.
    #[instrument(skip(self, data, pool, options), fields(pool_size = pool.len()))]
    pub async fn create_job(
        &self,
        kind: &str,
        data: serde_json::Value,
        pool: &[NodeAddress],
        assign: Option<NodeAddress>,
        options: JobOptions,
    ) -> QueueResult<(String, NodeAddress)> {
        if kind.is_empty() {
            return Err(QueueError::InvalidArgument(
                "Job kind must not be empty".to_string(),
            ));
        }
        let mut members = normalize_pool(pool);
        let owner = match assign {
            Some(owner) => owner,
            None => members.choose(&mut rand::rng()).cloned().ok_or_else(|| {
                QueueError::InvalidArgument("Pool must contain at least one node".to_string())
            })?,
        };
        if !members.contains(&owner) {
            members.push(owner.clone());
        }

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord::new(
            kind,
            data,
            owner.clone(),
            options.priority.unwrap_or(self.config.default_priority),
            options.timeout.unwrap_or_else(|| self.config.default_timeout()),
        );

        let connections = &self.ctx.connections;
        let keys = &self.ctx.keys;
        let pool_report = update_pool(connections, keys, &members).await;
        let report = distribute_job(connections, keys, &job_id, &record, &members).await?;
        if !report.reached(&owner) {
            warn!("Job {} record did not reach its owner {}", job_id, owner);
        }

        let client = connections.get(&owner).await?;
        index::activate(client.as_ref(), keys, &job_id, &record).await?;

        info!(
            "Created {} job {} on {} (record on {} of {} nodes, pool on {} of {})",
            kind,
            job_id,
            owner,
            report.succeeded.len(),
            members.len(),
            pool_report.succeeded.len(),
            members.len()
        );
        Ok((job_id, owner))
    }

    /// Claim a job through `node`, which may be any pool member holding its
    /// record.
    pub async fn claim_job(&self, job_id: &str, node: &NodeAddress) -> QueueResult<Job> {
        Job::open(self.ctx.clone(), job_id, node).await
    }

    /// Claim a job through the configured default node.
    pub async fn claim_job_default(&self, job_id: &str) -> QueueResult<Job> {
        self.claim_job(job_id, &self.config.default_node).await
    }

    /// Every job known to `node`, highest priority first.
    pub async fn jobs(&self, node: &NodeAddress) -> QueueResult<Vec<String>> {
        self.range(node, &self.ctx.keys.jobs()).await
    }

    /// Jobs in `state` on `node`. Only owners hold state indices.
    pub async fn jobs_in_state(&self, node: &NodeAddress, state: &str) -> QueueResult<Vec<String>> {
        self.range(node, &self.ctx.keys.state(state)).await
    }

    pub async fn jobs_of_kind_in_state(
        &self,
        node: &NodeAddress,
        kind: &str,
        state: &str,
    ) -> QueueResult<Vec<String>> {
        self.range(node, &self.ctx.keys.kind_state(kind, state)).await
    }

    /// Jobs assigned to `owner`, as replicated to `node`.
    pub async fn jobs_owned_by(
        &self,
        node: &NodeAddress,
        owner: &NodeAddress,
    ) -> QueueResult<Vec<String>> {
        self.range(node, &self.ctx.keys.owned_jobs(owner)).await
    }

    /// Kinds of every job that has been saved through `node`, sorted.
    pub async fn known_kinds(&self, node: &NodeAddress) -> QueueResult<Vec<String>> {
        let client = self.ctx.connections.get(node).await?;
        let mut kinds: Vec<String> = client
            .members(&self.ctx.keys.kinds())
            .await?
            .into_iter()
            .collect();
        kinds.sort();
        Ok(kinds)
    }

    pub async fn pool_members(&self, node: &NodeAddress) -> QueueResult<Vec<NodeAddress>> {
        let client = self.ctx.connections.get(node).await?;
        Ok(parse_pool(client.members(&self.ctx.keys.pool()).await?))
    }

    /// Read a job's record from `node` without claiming it.
    pub async fn load_record(&self, node: &NodeAddress, job_id: &str) -> QueueResult<JobRecord> {
        let client = self.ctx.connections.get(node).await?;
        load_record(client.as_ref(), &self.ctx, job_id).await
    }

    /// Stored lease expiration on `node`; `None` if the job is unclaimed.
    pub async fn lease_expiration(
        &self,
        node: &NodeAddress,
        job_id: &str,
    ) -> QueueResult<Option<f64>> {
        let client = self.ctx.connections.get(node).await?;
        lease::expiration(client.as_ref(), &self.ctx.keys, job_id).await
    }

    /// Drop every cached store connection.
    pub async fn close(&self) {
        self.ctx.connections.close().await;
    }

    async fn range(&self, node: &NodeAddress, key: &str) -> QueueResult<Vec<String>> {
        let client = self.ctx.connections.get(node).await?;
        client.range_by_rank(key, 0, -1).await
    }
}
