//! Queue configuration: defaults, optional TOML file, `QLUSTER_` environment
//! overrides.

pub mod models;

pub use models::{LoggingConfig, QueueConfig, RedisConfig};
