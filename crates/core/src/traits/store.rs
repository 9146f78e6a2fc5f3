use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::NodeAddress;
use crate::QueueResult;

/// Primitive operations the queue needs from one backing-store node.
///
/// Only single-key operations are atomic. `set_if_absent` and
/// `read_and_replace` are the building blocks of the lease protocol.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Address of the node this client talks to.
    fn address(&self) -> &NodeAddress;

    async fn exists(&self, key: &str) -> QueueResult<bool>;

    async fn delete_key(&self, key: &str) -> QueueResult<()>;

    // Hash-like records.
    async fn get_all(&self, key: &str) -> QueueResult<HashMap<String, String>>;

    async fn set_field(&self, key: &str, field: &str, value: &str) -> QueueResult<()>;

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> QueueResult<()>;

    // Scalars.
    async fn get_value(&self, key: &str) -> QueueResult<Option<String>>;

    /// Returns `true` when the key was absent and is now set.
    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool>;

    /// Unconditionally replaces the value, returning the one it replaced.
    async fn read_and_replace(&self, key: &str, value: &str) -> QueueResult<Option<String>>;

    async fn set_value(&self, key: &str, value: &str) -> QueueResult<()>;

    // Sets.
    async fn add_member(&self, key: &str, member: &str) -> QueueResult<()>;

    async fn members(&self, key: &str) -> QueueResult<HashSet<String>>;

    // Sorted sets.
    async fn add_scored(&self, key: &str, member: &str, score: f64) -> QueueResult<()>;

    async fn remove_member(&self, key: &str, member: &str) -> QueueResult<()>;

    /// Members by ascending score; negative indices count from the end.
    async fn range_by_rank(&self, key: &str, start: isize, end: isize) -> QueueResult<Vec<String>>;
}

/// Opens a client for a node address.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, address: &NodeAddress) -> QueueResult<Arc<dyn StoreClient>>;
}
