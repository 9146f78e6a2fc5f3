//! Lease/claim protocol.
//!
//! A lease is a single scalar holding the expiration time (epoch seconds) of
//! the current owner's claim on a job. It is only ever touched with
//! set-if-absent, read-and-replace and plain writes, so it works on any node
//! that offers those primitives atomically per key.

use std::time::Duration;

use qluster_core::{Clock, KeySpace, QueueError, QueueResult, StoreClient};
use tracing::{debug, instrument};

fn format_expiration(expires: f64) -> String {
    expires.to_string()
}

fn parse_expiration(job_id: &str, raw: &str) -> QueueResult<f64> {
    raw.trim().parse::<f64>().map_err(|e| {
        QueueError::Serialization(format!("Job {job_id} has invalid lease value {raw:?}: {e}"))
    })
}

/// Try to take the lease on `job_id` for `timeout`.
///
/// Returns the new expiration on success. A lapsed lease is taken over with
/// a read-and-replace and accepted when the value it replaced is not later
/// than ours. Two workers racing on the same lapsed lease can both pass that
/// test.
#[instrument(skip(store, keys, clock), fields(node = %store.address()))]
pub async fn acquire(
    store: &dyn StoreClient,
    keys: &KeySpace,
    clock: &dyn Clock,
    job_id: &str,
    timeout: Duration,
) -> QueueResult<f64> {
    let now = clock.epoch_seconds();
    let lease_key = keys.lease(job_id);
    let candidate = now + timeout.as_secs_f64();

    if !store.exists(&keys.job(job_id)).await? {
        return Err(QueueError::does_not_exist(job_id));
    }

    if store
        .set_if_absent(&lease_key, &format_expiration(candidate))
        .await?
    {
        debug!("Acquired fresh lease on {} until {}", job_id, candidate);
        return Ok(candidate);
    }

    // A lease that vanished between the two calls counts as lapsed.
    let current = match store.get_value(&lease_key).await? {
        Some(raw) => parse_expiration(job_id, &raw)?,
        None => 0.0,
    };

    if current < now {
        let previous = match store
            .read_and_replace(&lease_key, &format_expiration(candidate))
            .await?
        {
            Some(raw) => parse_expiration(job_id, &raw)?,
            None => 0.0,
        };
        if previous <= candidate {
            debug!(
                "Took over lapsed lease on {} (was {}) until {}",
                job_id, previous, candidate
            );
            return Ok(candidate);
        }
        return Err(QueueError::locked(
            format!("Job {job_id} is locked"),
            previous,
        ));
    }

    Err(QueueError::locked(format!("Job {job_id} is locked"), current))
}

/// Unconditionally push the lease out to `now + timeout`.
pub async fn renew(
    store: &dyn StoreClient,
    keys: &KeySpace,
    clock: &dyn Clock,
    job_id: &str,
    timeout: Duration,
) -> QueueResult<f64> {
    let expires = clock.epoch_seconds() + timeout.as_secs_f64();
    store
        .set_value(&keys.lease(job_id), &format_expiration(expires))
        .await?;
    Ok(expires)
}

pub async fn release(store: &dyn StoreClient, keys: &KeySpace, job_id: &str) -> QueueResult<()> {
    store.delete_key(&keys.lease(job_id)).await
}

/// Stored expiration, or `None` when the job has never been claimed.
pub async fn expiration(
    store: &dyn StoreClient,
    keys: &KeySpace,
    job_id: &str,
) -> QueueResult<Option<f64>> {
    store
        .get_value(&keys.lease(job_id))
        .await?
        .map(|raw| parse_expiration(job_id, &raw))
        .transpose()
}
