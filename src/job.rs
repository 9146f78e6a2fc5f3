//! A claimed job.
//!
//! Every mutating call first runs the timeout guard: a handle whose local
//! lease deadline has passed re-claims the job before touching the store,
//! and fails with `Locked` if another worker got there first. Every
//! successful write pushes the lease out again.

use std::sync::Arc;
use std::time::Duration;

use qluster_core::{
    JobRecord, NodeAddress, Priority, QueueError, QueueResult, StoreClient,
};
use tracing::{debug, info, instrument, warn};

use crate::index;
use crate::lease;
use crate::queue::QueueContext;
use crate::replication::{parse_pool, purge_job};

/// Read a job's record from one node.
pub(crate) async fn load_record(
    client: &dyn StoreClient,
    ctx: &QueueContext,
    job_id: &str,
) -> QueueResult<JobRecord> {
    let key = ctx.keys.job(job_id);
    if !client.exists(&key).await? {
        return Err(QueueError::does_not_exist(job_id));
    }
    JobRecord::from_fields(job_id, client.get_all(&key).await?)
}

/// Handle on a job this worker holds the lease for.
pub struct Job {
    job_id: String,
    record: JobRecord,
    client: Arc<dyn StoreClient>,
    ctx: Arc<QueueContext>,
    pool: Vec<NodeAddress>,
    expiration: f64,
    removed: bool,
}

impl Job {
    /// Load the job through `node` and claim it on its owner.
    ///
    /// If the record names a different owner, the handle follows it there so
    /// that state indices and the lease live on the owner.
    #[instrument(skip(ctx, node), fields(node = %node))]
    pub(crate) async fn open(
        ctx: Arc<QueueContext>,
        job_id: &str,
        node: &NodeAddress,
    ) -> QueueResult<Self> {
        let mut client = ctx.connections.get(node).await?;
        let mut record = load_record(client.as_ref(), &ctx, job_id).await?;
        if &record.owner != node {
            debug!("Job {} is owned by {}, following", job_id, record.owner);
            client = ctx.connections.get(&record.owner).await?;
            record = load_record(client.as_ref(), &ctx, job_id).await?;
        }

        let expiration = lease::acquire(
            client.as_ref(),
            &ctx.keys,
            ctx.clock.as_ref(),
            job_id,
            record.timeout,
        )
        .await?;
        let pool = parse_pool(client.members(&ctx.keys.pool()).await?);

        info!("Claimed job {} on {} until {}", job_id, record.owner, expiration);
        Ok(Self {
            job_id: job_id.to_string(),
            record,
            client,
            ctx,
            pool,
            expiration,
            removed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.job_id
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    /// Stored value of a record field; `None` for null or unknown fields.
    pub fn get(&self, key: &str) -> Option<String> {
        self.record.get(key)
    }

    pub fn state(&self) -> Option<&str> {
        self.record.state.as_deref()
    }

    pub fn kind(&self) -> &str {
        &self.record.kind
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.record.data
    }

    pub fn priority(&self) -> Priority {
        self.record.priority
    }

    pub fn owner(&self) -> &NodeAddress {
        &self.record.owner
    }

    /// Pool membership as read from the owner when the job was claimed.
    pub fn pool(&self) -> &[NodeAddress] {
        &self.pool
    }

    /// Local lease deadline in epoch seconds. Zero once removed.
    pub fn expiration(&self) -> f64 {
        self.expiration
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Time left on the local lease deadline, never negative.
    pub fn time_to_live(&self) -> Duration {
        let remaining = self.expiration - self.ctx.clock.epoch_seconds();
        Duration::try_from_secs_f64(remaining.max(0.0)).unwrap_or(Duration::ZERO)
    }

    /// Re-read the record from the owner, discarding local changes.
    pub async fn reload(&mut self) -> QueueResult<()> {
        self.ensure_not_removed()?;
        self.record = load_record(self.client.as_ref(), &self.ctx, &self.job_id).await?;
        Ok(())
    }

    /// Run the claim protocol again for this handle.
    pub async fn claim(&mut self) -> QueueResult<f64> {
        self.ensure_not_removed()?;
        self.expiration = lease::acquire(
            self.client.as_ref(),
            &self.ctx.keys,
            self.ctx.clock.as_ref(),
            &self.job_id,
            self.record.timeout,
        )
        .await?;
        Ok(self.expiration)
    }

    /// Write the whole record and extend the lease.
    pub async fn save(&mut self) -> QueueResult<()> {
        self.guard().await?;
        self.persist().await
    }

    /// Set one record field and save.
    ///
    /// `state` is dispatched to `transition_to` with `value` as the target
    /// state. Identity fields cannot be written.
    #[instrument(skip(self, value), fields(job_id = %self.job_id))]
    pub async fn set(&mut self, key: &str, value: &str) -> QueueResult<()> {
        self.ensure_not_removed()?;
        if key == "state" {
            return self.transition_to(value).await;
        }

        self.guard().await?;
        let mut staged = self.record.clone();
        staged.set_field(key, value)?;
        self.record = staged;
        self.persist().await
    }

    /// Move the job to `state`, re-indexing it on the owner.
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    pub async fn transition_to(&mut self, state: &str) -> QueueResult<()> {
        self.ensure_not_removed()?;
        if state.is_empty() {
            return Err(QueueError::InvalidArgument(
                "State must not be empty".to_string(),
            ));
        }
        self.guard().await?;

        let previous = self.record.state.clone();
        let keys = &self.ctx.keys;
        index::clear_state(self.client.as_ref(), keys, &self.job_id, &mut self.record).await?;
        index::index_state(
            self.client.as_ref(),
            keys,
            &self.job_id,
            &mut self.record,
            state,
        )
        .await?;
        self.client
            .set_field(&keys.job(&self.job_id), "state", state)
            .await?;
        self.persist().await?;

        info!(
            "Job {} moved from {} to {}",
            self.job_id,
            previous.as_deref().unwrap_or("-"),
            state
        );
        Ok(())
    }

    /// Stamp `failed_at` and `error`, then save.
    pub async fn fail(&mut self, error: impl Into<String>) -> QueueResult<()> {
        self.guard().await?;
        let error = error.into();
        warn!("Job {} failed: {}", self.job_id, error);
        self.record.failed_at = Some(self.ctx.clock.now());
        self.record.error = Some(error).filter(|e| !e.is_empty());
        self.persist().await
    }

    /// Clear the owner's state indices, delete the job from every pool node
    /// and drop the lease. The handle is unusable afterwards.
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    pub async fn remove(&mut self) -> QueueResult<()> {
        self.guard().await?;
        let keys = &self.ctx.keys;
        index::clear_state(self.client.as_ref(), keys, &self.job_id, &mut self.record).await?;

        let mut targets = self.pool.clone();
        if !targets.contains(&self.record.owner) {
            targets.push(self.record.owner.clone());
        }
        let report = purge_job(
            &self.ctx.connections,
            keys,
            &self.job_id,
            &self.record.owner,
            &targets,
        )
        .await;
        if !report.is_complete() {
            warn!(
                "Job {} left on {} unreachable node(s)",
                self.job_id,
                report.failed.len()
            );
        }

        lease::release(self.client.as_ref(), keys, &self.job_id).await?;
        self.expiration = 0.0;
        self.removed = true;
        info!("Removed job {} from {} node(s)", self.job_id, report.succeeded.len());
        Ok(())
    }

    fn ensure_not_removed(&self) -> QueueResult<()> {
        if self.removed {
            return Err(QueueError::removed(&self.job_id));
        }
        Ok(())
    }

    /// Refuse removed handles and re-claim a lapsed lease.
    async fn guard(&mut self) -> QueueResult<()> {
        self.ensure_not_removed()?;
        if self.ctx.clock.epoch_seconds() <= self.expiration {
            return Ok(());
        }

        debug!("Lease on {} lapsed locally, re-claiming", self.job_id);
        match self.claim().await {
            Ok(_) => Ok(()),
            Err(QueueError::Locked { expires, .. }) => {
                warn!("Lost job {} to another worker", self.job_id);
                Err(QueueError::locked(
                    "Job timed out and claimed by another worker",
                    expires,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Write the record with fresh timestamps and renew the lease. The first
    /// write also registers the kind and stamps `created_at`.
    async fn persist(&mut self) -> QueueResult<()> {
        let keys = &self.ctx.keys;
        let now = self.ctx.clock.now();
        let mut staged = self.record.clone();
        if staged.created_at.is_none() {
            self.client.add_member(&keys.kinds(), &staged.kind).await?;
            staged.created_at = Some(now);
        }
        staged.updated_at = Some(now);

        self.client
            .set_fields(&keys.job(&self.job_id), &staged.to_fields()?)
            .await?;
        self.record = staged;

        self.expiration = lease::renew(
            self.client.as_ref(),
            keys,
            self.ctx.clock.as_ref(),
            &self.job_id,
            self.record.timeout,
        )
        .await?;
        debug!("Saved job {}, lease until {}", self.job_id, self.expiration);
        Ok(())
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("job_id", &self.job_id)
            .field("record", &self.record)
            .field("node", self.client.address())
            .field("expiration", &self.expiration)
            .field("removed", &self.removed)
            .finish()
    }
}
