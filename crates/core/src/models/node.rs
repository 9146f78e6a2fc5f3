use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::QueueError;

/// Address of one backing-store node in a queue cluster.
///
/// Stored in the pool membership set as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl Default for NodeAddress {
    fn default() -> Self {
        Self::localhost(6379)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| QueueError::InvalidArgument(format!("Invalid node address: {s}")))?;
        if host.is_empty() {
            return Err(QueueError::InvalidArgument(format!(
                "Invalid node address: {s}"
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| QueueError::InvalidArgument(format!("Invalid port in {s}: {e}")))?;
        Ok(Self::new(host, port))
    }
}
