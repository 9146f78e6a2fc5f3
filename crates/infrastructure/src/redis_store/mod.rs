//! Redis-backed store nodes.

pub mod connection_manager;
pub mod store;

pub use connection_manager::RedisConnector;
pub use store::RedisStore;
