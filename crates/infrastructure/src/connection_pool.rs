use std::collections::HashMap;
use std::sync::Arc;

use qluster_core::{NodeAddress, QueueResult, StoreClient, StoreConnector};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Process-local connections to store nodes, keyed by address.
///
/// Connections are opened on first use through the connector and reused
/// afterwards. `close` drops every cached connection.
pub struct ConnectionPool {
    connector: Arc<dyn StoreConnector>,
    clients: Mutex<HashMap<NodeAddress, Arc<dyn StoreClient>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `address`, connecting if needed.
    ///
    /// A failed connection is not cached, so the next call tries again.
    /// The lock is not held while connecting; if two callers race to open
    /// the same node, the first connection stored wins.
    pub async fn get(&self, address: &NodeAddress) -> QueueResult<Arc<dyn StoreClient>> {
        if let Some(client) = self.clients.lock().await.get(address) {
            return Ok(client.clone());
        }

        debug!("Opening store connection to {}", address);
        let client = self.connector.connect(address).await?;
        let mut clients = self.clients.lock().await;
        Ok(clients.entry(address.clone()).or_insert(client).clone())
    }

    /// Forget the connection to one node, e.g. after it failed.
    pub async fn evict(&self, address: &NodeAddress) {
        if self.clients.lock().await.remove(address).is_some() {
            debug!("Evicted store connection to {}", address);
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn close(&self) {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        clients.clear();
        info!("Closed {} store connections", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryCluster;
    use async_trait::async_trait;
    use qluster_core::QueueError;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_connections_are_reused() {
        let address = NodeAddress::localhost(11910);
        let cluster = InMemoryCluster::with_nodes(&[address.clone()]).await;
        let pool = ConnectionPool::new(Arc::new(cluster));

        let first = pool.get(&address).await.unwrap();
        let second = pool.get(&address).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len().await, 1);

        pool.close().await;
        assert!(pool.is_empty().await);
    }

    /// Takes a while to fail for one address and defers to the cluster for
    /// everything else.
    struct SlowConnector {
        cluster: InMemoryCluster,
        slow: NodeAddress,
        delay: Duration,
    }

    #[async_trait]
    impl StoreConnector for SlowConnector {
        async fn connect(&self, address: &NodeAddress) -> QueueResult<Arc<dyn StoreClient>> {
            if address == &self.slow {
                tokio::time::sleep(self.delay).await;
                return Err(QueueError::Store(format!("Timed out connecting to {address}")));
            }
            self.cluster.connect(address).await
        }
    }

    #[tokio::test]
    async fn test_slow_node_does_not_block_other_nodes() {
        let healthy = NodeAddress::localhost(11910);
        let slow = NodeAddress::localhost(11911);
        let connector = SlowConnector {
            cluster: InMemoryCluster::with_nodes(&[healthy.clone()]).await,
            slow: slow.clone(),
            delay: Duration::from_secs(2),
        };
        let pool = Arc::new(ConnectionPool::new(Arc::new(connector)));

        let pending = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get(&slow).await.is_err() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        assert!(pool.get(&healthy).await.is_ok());
        assert!(started.elapsed() < Duration::from_millis(500));

        assert!(pending.await.unwrap());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_cached() {
        let address = NodeAddress::localhost(11910);
        let cluster = InMemoryCluster::new();
        let pool = ConnectionPool::new(Arc::new(cluster.clone()));

        assert!(pool.get(&address).await.is_err());
        assert!(pool.is_empty().await);

        cluster.add_node(address.clone()).await;
        assert!(pool.get(&address).await.is_ok());
    }
}
