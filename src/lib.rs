//! Distributed job queue coordination over a pool of Redis-like store nodes.
//!
//! Producers create jobs with [`JobQueue::create_job`]; the record is copied
//! to every pool node and the job is activated on one owner node. Workers
//! claim jobs with [`JobQueue::claim_job`] and get a [`Job`] handle holding a
//! time-bounded lease, which every mutation re-validates and renews.

pub mod index;
pub mod job;
pub mod lease;
pub mod queue;
pub mod replication;

pub use job::Job;
pub use queue::JobQueue;
pub use replication::ReplicationReport;

pub use qluster_core::{
    init_logging, Clock, JobOptions, JobRecord, KeySpace, ManualClock, NodeAddress, Priority,
    QueueConfig, QueueError, QueueResult, StoreClient, StoreConnector, SystemClock,
};
pub use qluster_infrastructure::{InMemoryCluster, InMemoryStore, RedisConnector};
