use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qluster_core::{
    NodeAddress, QueueError, QueueResult, RedisConfig, StoreClient, StoreConnector,
};
use redis::aio::ConnectionManager;
use redis::Client;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use super::store::RedisStore;

/// Opens Redis connections to pool nodes.
///
/// Each connection is established with retries and checked with `PING`
/// before it is handed out.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    config: RedisConfig,
}

impl RedisConnector {
    pub fn new(config: RedisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn connect_with_retry(&self, address: &NodeAddress) -> QueueResult<ConnectionManager> {
        let redis_url = self.config.build_url(address);
        let client = Client::open(redis_url).map_err(|e| {
            QueueError::Store(format!("Failed to create Redis client for {address}: {e}"))
        })?;
        let connect_timeout = Duration::from_secs(self.config.connection_timeout_seconds);

        let mut last_error = None;
        for attempt in 0..self.config.max_retry_attempts {
            match timeout(connect_timeout, client.get_connection_manager()).await {
                Ok(Ok(conn)) => {
                    if attempt > 0 {
                        debug!(
                            "Successfully reconnected to Redis at {} after {} attempts",
                            address,
                            attempt + 1
                        );
                    }
                    return Ok(conn);
                }
                Ok(Err(e)) => last_error = Some(e.to_string()),
                Err(_) => last_error = Some(format!("timed out after {connect_timeout:?}")),
            }

            if attempt + 1 < self.config.max_retry_attempts {
                warn!(
                    "Failed to connect to Redis at {} (attempt {}/{}): {}. Retrying in {}s...",
                    address,
                    attempt + 1,
                    self.config.max_retry_attempts,
                    last_error.as_deref().unwrap_or("unknown"),
                    self.config.retry_delay_seconds
                );
                sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
            }
        }

        let error_msg = format!(
            "Failed to connect to Redis at {} after {} attempts. Last error: {}",
            address,
            self.config.max_retry_attempts,
            last_error.unwrap_or_else(|| "Unknown".to_string())
        );
        error!("{}", error_msg);
        Err(QueueError::Store(error_msg))
    }

    async fn test_connection(
        &self,
        address: &NodeAddress,
        conn: &mut ConnectionManager,
    ) -> QueueResult<()> {
        let response: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| QueueError::Store(format!("Redis PING to {address} failed: {e}")))?;
        if response == "PONG" {
            debug!("Redis connection test to {} successful", address);
            Ok(())
        } else {
            let error_msg = format!("Unexpected PING response from {address}: {response}");
            error!("{}", error_msg);
            Err(QueueError::Store(error_msg))
        }
    }
}

impl Default for RedisConnector {
    fn default() -> Self {
        Self::new(RedisConfig::default())
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self, address: &NodeAddress) -> QueueResult<Arc<dyn StoreClient>> {
        let mut conn = self.connect_with_retry(address).await?;
        self.test_connection(address, &mut conn).await?;
        Ok(Arc::new(RedisStore::new(address.clone(), conn)))
    }
}
