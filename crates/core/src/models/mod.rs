//! # 数据模型
//!
//! Job records, priorities, node addresses and the key layout shared by
//! every store node in a queue cluster.

pub mod job;
pub mod keys;
pub mod node;

pub use job::{JobOptions, JobRecord, Priority, DEFAULT_TIMEOUT, INITIAL_STATE};
pub use keys::KeySpace;
pub use node::NodeAddress;
