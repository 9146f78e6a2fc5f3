use super::node::NodeAddress;

/// Key conventions for everything the queue keeps in a store node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("q")
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Record hash of a job.
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Lease expiration scalar of a job.
    pub fn lease(&self, job_id: &str) -> String {
        format!("{}:job:{}:expires", self.prefix, job_id)
    }

    /// Global listing of every job known to the pool.
    pub fn jobs(&self) -> String {
        format!("{}:jobs", self.prefix)
    }

    /// Jobs assigned to `owner`.
    pub fn owned_jobs(&self, owner: &NodeAddress) -> String {
        format!("{}:jobs:{}:{}", self.prefix, owner.host, owner.port)
    }

    pub fn state(&self, state: &str) -> String {
        format!("{}:jobs:{}", self.prefix, state)
    }

    pub fn kind_state(&self, kind: &str, state: &str) -> String {
        format!("{}:jobs:{}:{}", self.prefix, kind, state)
    }

    pub fn pool(&self) -> String {
        format!("{}:pool", self.prefix)
    }

    pub fn kinds(&self) -> String {
        format!("{}:kinds", self.prefix)
    }
}
