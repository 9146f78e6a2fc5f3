//! Shared building blocks for the qluster job queue: errors, configuration,
//! logging, the job data model and the store ports.

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoggingConfig, QueueConfig, RedisConfig};
pub use errors::*;
pub use logging::{init_logging, init_logging_from_config};
pub use models::{JobOptions, JobRecord, KeySpace, NodeAddress, Priority, DEFAULT_TIMEOUT, INITIAL_STATE};
pub use traits::{StoreClient, StoreConnector};
