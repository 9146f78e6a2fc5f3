use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use qluster_core::{NodeAddress, QueueError, QueueResult, StoreClient, StoreConnector};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 内存存储实现
///
/// A single store node kept in process memory with the same per-key
/// semantics the Redis adapter relies on. Used for embedded deployments and
/// tests. A node can be taken offline to simulate an unreachable peer.
#[derive(Debug)]
pub struct InMemoryStore {
    address: NodeAddress,
    data: RwLock<HashMap<String, Entry>>,
    online: AtomicBool,
}

#[derive(Debug, Clone)]
enum Entry {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    Sorted(HashMap<String, f64>),
}

fn wrong_type(key: &str) -> QueueError {
    QueueError::Store(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

impl InMemoryStore {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            data: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of keys currently held.
    pub async fn key_count(&self) -> usize {
        self.data.read().await.len()
    }

    fn check_online(&self) -> QueueResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(QueueError::Store(format!(
                "Connection refused: {}",
                self.address
            )))
        }
    }
}

/// Resolves a possibly negative rank into an index, Redis style.
fn resolve_rank(rank: isize, len: usize) -> isize {
    if rank < 0 {
        len as isize + rank
    } else {
        rank
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    async fn exists(&self, key: &str) -> QueueResult<bool> {
        self.check_online()?;
        Ok(self.data.read().await.contains_key(key))
    }

    async fn delete_key(&self, key: &str) -> QueueResult<()> {
        self.check_online()?;
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn get_all(&self, key: &str) -> QueueResult<HashMap<String, String>> {
        self.check_online()?;
        match self.data.read().await.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> QueueResult<()> {
        self.set_fields(key, &[(field.to_string(), value.to_string())])
            .await
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> QueueResult<()> {
        self.check_online()?;
        let mut data = self.data.write().await;
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry {
            Entry::Hash(hash) => {
                hash.extend(fields.iter().cloned());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn get_value(&self, key: &str) -> QueueResult<Option<String>> {
        self.check_online()?;
        match self.data.read().await.get(key) {
            None => Ok(None),
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool> {
        self.check_online()?;
        let mut data = self.data.write().await;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), Entry::Scalar(value.to_string()));
        Ok(true)
    }

    async fn read_and_replace(&self, key: &str, value: &str) -> QueueResult<Option<String>> {
        self.check_online()?;
        let mut data = self.data.write().await;
        match data.get(key) {
            None | Some(Entry::Scalar(_)) => {}
            Some(_) => return Err(wrong_type(key)),
        }
        let previous = data.insert(key.to_string(), Entry::Scalar(value.to_string()));
        Ok(match previous {
            Some(Entry::Scalar(previous)) => Some(previous),
            _ => None,
        })
    }

    async fn set_value(&self, key: &str, value: &str) -> QueueResult<()> {
        self.check_online()?;
        self.data
            .write()
            .await
            .insert(key.to_string(), Entry::Scalar(value.to_string()));
        Ok(())
    }

    async fn add_member(&self, key: &str, member: &str) -> QueueResult<()> {
        self.check_online()?;
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()))
        {
            Entry::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn members(&self, key: &str) -> QueueResult<HashSet<String>> {
        self.check_online()?;
        match self.data.read().await.get(key) {
            None => Ok(HashSet::new()),
            Some(Entry::Set(set)) => Ok(set.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn add_scored(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        self.check_online()?;
        let mut data = self.data.write().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Sorted(HashMap::new()))
        {
            Entry::Sorted(scores) => {
                scores.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn remove_member(&self, key: &str, member: &str) -> QueueResult<()> {
        self.check_online()?;
        let mut data = self.data.write().await;
        let now_empty = match data.get_mut(key) {
            None => return Ok(()),
            Some(Entry::Sorted(scores)) => {
                scores.remove(member);
                scores.is_empty()
            }
            Some(_) => return Err(wrong_type(key)),
        };
        // Redis drops empty sorted sets.
        if now_empty {
            data.remove(key);
        }
        Ok(())
    }

    async fn range_by_rank(&self, key: &str, start: isize, end: isize) -> QueueResult<Vec<String>> {
        self.check_online()?;
        let data = self.data.read().await;
        let scores = match data.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::Sorted(scores)) => scores,
            Some(_) => return Err(wrong_type(key)),
        };

        let mut ordered: Vec<(&String, f64)> = scores.iter().map(|(m, s)| (m, *s)).collect();
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let len = ordered.len();
        let start = resolve_rank(start, len).max(0);
        let end = resolve_rank(end, len).min(len as isize - 1);
        if len == 0 || start > end {
            return Ok(Vec::new());
        }
        Ok(ordered[start as usize..=end as usize]
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect())
    }
}

/// A set of in-memory nodes addressable by `NodeAddress`.
///
/// Connecting to an address that was never added, or to a node that has
/// been taken offline, fails like an unreachable Redis would.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCluster {
    nodes: Arc<RwLock<HashMap<NodeAddress, Arc<InMemoryStore>>>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cluster with one node per address.
    pub async fn with_nodes(addresses: &[NodeAddress]) -> Self {
        let cluster = Self::new();
        for address in addresses {
            cluster.add_node(address.clone()).await;
        }
        cluster
    }

    pub async fn add_node(&self, address: NodeAddress) -> Arc<InMemoryStore> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .entry(address.clone())
            .or_insert_with(|| Arc::new(InMemoryStore::new(address.clone())))
            .clone();
        info!("In-memory store node {} ready", address);
        node
    }

    /// Direct access to a node, bypassing reachability checks.
    pub async fn node(&self, address: &NodeAddress) -> Option<Arc<InMemoryStore>> {
        self.nodes.read().await.get(address).cloned()
    }

    pub async fn set_online(&self, address: &NodeAddress, online: bool) {
        if let Some(node) = self.node(address).await {
            debug!("Marking in-memory node {} online={}", address, online);
            node.set_online(online);
        }
    }
}

#[async_trait]
impl StoreConnector for InMemoryCluster {
    async fn connect(&self, address: &NodeAddress) -> QueueResult<Arc<dyn StoreClient>> {
        match self.node(address).await {
            Some(node) if node.is_online() => Ok(node as Arc<dyn StoreClient>),
            _ => Err(QueueError::Store(format!(
                "Failed to connect to store node {address}"
            ))),
        }
    }
}
