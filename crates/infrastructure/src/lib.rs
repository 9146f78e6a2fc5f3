pub mod connection_pool;
pub mod in_memory_store;
pub mod redis_store;

pub use connection_pool::ConnectionPool;
pub use in_memory_store::{InMemoryCluster, InMemoryStore};
pub use redis_store::{RedisConnector, RedisStore};
