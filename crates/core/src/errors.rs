use thiserror::Error;

/// Errors raised by the job queue.
///
/// `DoesNotExist`, `Locked` and `Removed` are the steady-state outcomes a
/// worker has to handle in a contended queue. `Store` covers failures of the
/// backing node itself.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {job_id}")]
    DoesNotExist { job_id: String },

    #[error("{message}")]
    Locked { message: String, expires: f64 },

    #[error("Cannot write to removed job: {job_id}")]
    Removed { job_id: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl QueueError {
    pub fn does_not_exist(job_id: impl Into<String>) -> Self {
        QueueError::DoesNotExist {
            job_id: job_id.into(),
        }
    }

    pub fn locked(message: impl Into<String>, expires: f64) -> Self {
        QueueError::Locked {
            message: message.into(),
            expires,
        }
    }

    pub fn removed(job_id: impl Into<String>) -> Self {
        QueueError::Removed {
            job_id: job_id.into(),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, QueueError::Locked { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, QueueError::Removed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::DoesNotExist { .. })
    }

    /// Lease expiration carried by a `Locked` error.
    pub fn lock_expiration(&self) -> Option<f64> {
        match self {
            QueueError::Locked { expires, .. } => Some(*expires),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type QueueResult<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_carries_expiration() {
        let err = QueueError::locked("Job abc is locked", 1700000000.5);
        assert!(err.is_locked());
        assert!(!err.is_removed());
        assert_eq!(err.lock_expiration(), Some(1700000000.5));
        assert_eq!(err.to_string(), "Job abc is locked");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            QueueError::does_not_exist("abc").to_string(),
            "Job not found: abc"
        );
        assert_eq!(
            QueueError::removed("abc").to_string(),
            "Cannot write to removed job: abc"
        );
        assert!(QueueError::does_not_exist("abc").is_not_found());
        assert_eq!(QueueError::removed("abc").lock_expiration(), None);
    }
}
