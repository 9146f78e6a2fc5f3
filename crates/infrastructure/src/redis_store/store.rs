use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use qluster_core::{NodeAddress, QueueError, QueueResult, StoreClient};
use redis::aio::ConnectionManager;
use redis::FromRedisValue;
use tracing::{debug, error};

/// One Redis node seen through the queue's primitive operations.
pub struct RedisStore {
    address: NodeAddress,
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(address: NodeAddress, conn: ConnectionManager) -> Self {
        Self { address, conn }
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> QueueResult<T> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn).await.map_err(|e| {
            error!("Redis command failed on {}: {}", self.address, e);
            QueueError::Store(format!("Redis command failed on {}: {e}", self.address))
        })
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    async fn exists(&self, key: &str) -> QueueResult<bool> {
        self.query(redis::cmd("EXISTS").arg(key)).await
    }

    async fn delete_key(&self, key: &str) -> QueueResult<()> {
        debug!("DEL {} on {}", key, self.address);
        let _: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    async fn get_all(&self, key: &str) -> QueueResult<HashMap<String, String>> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> QueueResult<()> {
        let _: i64 = self
            .query(redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(())
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> QueueResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(&cmd).await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> QueueResult<Option<String>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool> {
        self.query(redis::cmd("SETNX").arg(key).arg(value)).await
    }

    async fn read_and_replace(&self, key: &str, value: &str) -> QueueResult<Option<String>> {
        self.query(redis::cmd("GETSET").arg(key).arg(value)).await
    }

    async fn set_value(&self, key: &str, value: &str) -> QueueResult<()> {
        self.query(redis::cmd("SET").arg(key).arg(value)).await
    }

    async fn add_member(&self, key: &str, member: &str) -> QueueResult<()> {
        let _: i64 = self.query(redis::cmd("SADD").arg(key).arg(member)).await?;
        Ok(())
    }

    async fn members(&self, key: &str) -> QueueResult<HashSet<String>> {
        self.query(redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn add_scored(&self, key: &str, member: &str, score: f64) -> QueueResult<()> {
        debug!("ZADD {} {} {} on {}", key, score, member, self.address);
        let _: i64 = self
            .query(redis::cmd("ZADD").arg(key).arg(score).arg(member))
            .await?;
        Ok(())
    }

    async fn remove_member(&self, key: &str, member: &str) -> QueueResult<()> {
        debug!("ZREM {} {} on {}", key, member, self.address);
        let _: i64 = self.query(redis::cmd("ZREM").arg(key).arg(member)).await?;
        Ok(())
    }

    async fn range_by_rank(&self, key: &str, start: isize, end: isize) -> QueueResult<Vec<String>> {
        self.query(redis::cmd("ZRANGE").arg(key).arg(start).arg(end))
            .await
    }
}
