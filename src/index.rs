//! State index maintenance on a job's owner node.
//!
//! A job is listed in the per-state and per-kind-per-state sorted sets of
//! exactly one state, and that state matches the record's `state` field.
//! The sequences below are not atomic across keys; a crash between
//! `clear_state` and `index_state` leaves the job indexed under no state
//! until the next transition.

use qluster_core::{JobRecord, KeySpace, QueueResult, StoreClient};
use tracing::debug;

/// Drop the job from the indices of its current state and null the
/// persisted state field.
pub async fn clear_state(
    store: &dyn StoreClient,
    keys: &KeySpace,
    job_id: &str,
    record: &mut JobRecord,
) -> QueueResult<()> {
    if let Some(state) = record.state.as_deref() {
        store.remove_member(&keys.state(state), job_id).await?;
        store
            .remove_member(&keys.kind_state(&record.kind, state), job_id)
            .await?;
        debug!("Cleared state {} of job {}", state, job_id);
    }
    store.set_field(&keys.job(job_id), "state", "").await?;
    record.state = None;
    Ok(())
}

/// List the job under `state` on this node, including the global listing,
/// and record the state locally.
pub async fn index_state(
    store: &dyn StoreClient,
    keys: &KeySpace,
    job_id: &str,
    record: &mut JobRecord,
    state: &str,
) -> QueueResult<()> {
    let level = record.priority_level();
    store.add_scored(&keys.jobs(), job_id, level).await?;
    store.add_scored(&keys.state(state), job_id, level).await?;
    store
        .add_scored(&keys.kind_state(&record.kind, state), job_id, level)
        .await?;
    record.state = Some(state.to_string());
    debug!("Indexed job {} under state {}", job_id, state);
    Ok(())
}

/// Create-time activation: state indices only, for the record's current
/// state. The global listings are written by replication.
pub async fn activate(
    store: &dyn StoreClient,
    keys: &KeySpace,
    job_id: &str,
    record: &JobRecord,
) -> QueueResult<()> {
    let Some(state) = record.state.as_deref() else {
        return Ok(());
    };
    let level = record.priority_level();
    store.add_scored(&keys.state(state), job_id, level).await?;
    store
        .add_scored(&keys.kind_state(&record.kind, state), job_id, level)
        .await?;
    Ok(())
}
