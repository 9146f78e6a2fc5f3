pub mod app_config;
pub mod observability;
pub mod redis;

// Re-export main types for easier imports
pub use app_config::QueueConfig;
pub use observability::LoggingConfig;
pub use redis::RedisConfig;
