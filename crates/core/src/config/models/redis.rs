use serde::{Deserialize, Serialize};

use crate::models::NodeAddress;

/// Redis connection settings shared by every node in a pool.
///
/// Host and port come from the node address; everything else applies to all
/// nodes alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

impl RedisConfig {
    /// Validate Redis configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis database index must not be negative"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis connection timeout must be greater than 0"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow::anyhow!("Redis max retry attempts must be greater than 0"));
        }

        Ok(())
    }

    /// Build Redis connection URL for one node
    pub fn build_url(&self, address: &NodeAddress) -> String {
        let auth = if let Some(password) = &self.password {
            format!(":{password}@")
        } else {
            String::new()
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, address.host, address.port, self.database
        )
    }
}
