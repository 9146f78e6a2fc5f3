use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeAddress;
use crate::errors::{QueueError, QueueResult};

/// State every job starts in.
pub const INITIAL_STATE: &str = "inactive";

/// Lease duration used when neither the caller nor the config supplies one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Job priority.
///
/// Each priority maps to the score used in the sorted indices; lower scores
/// are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn level(self) -> f64 {
        match self {
            Priority::Low => 30.0,
            Priority::Normal => 20.0,
            Priority::High => 10.0,
            Priority::Critical => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(QueueError::InvalidArgument(format!(
                "Unknown priority: {other}"
            ))),
        }
    }
}

/// Producer options for a new job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    pub priority: Option<Priority>,
    pub timeout: Option<Duration>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// In-memory copy of a job's record hash.
///
/// Fields the queue knows about are typed; anything else a worker writes
/// through `set` is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub kind: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    /// `None` while the job is between `clear_state` and the next transition.
    pub state: Option<String>,
    pub timeout: Duration,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub owner: NodeAddress,
    pub extra: BTreeMap<String, String>,
}

impl JobRecord {
    pub fn new(
        kind: impl Into<String>,
        data: serde_json::Value,
        owner: NodeAddress,
        priority: Priority,
        timeout: Duration,
    ) -> Self {
        Self {
            kind: kind.into(),
            data,
            priority,
            state: Some(INITIAL_STATE.to_string()),
            timeout,
            created_at: None,
            updated_at: None,
            failed_at: None,
            error: None,
            owner,
            extra: BTreeMap::new(),
        }
    }

    /// Score of this job in every sorted index.
    pub fn priority_level(&self) -> f64 {
        self.priority.level()
    }

    /// Flatten into hash fields. Null values are written as the empty string.
    pub fn to_fields(&self) -> QueueResult<Vec<(String, String)>> {
        let mut fields = vec![
            ("kind".to_string(), self.kind.clone()),
            ("data".to_string(), serde_json::to_string(&self.data)?),
            ("priority".to_string(), self.priority.to_string()),
            ("state".to_string(), self.state.clone().unwrap_or_default()),
            ("timeout".to_string(), format_seconds(self.timeout)),
            ("created_at".to_string(), format_time(self.created_at)),
            ("updated_at".to_string(), format_time(self.updated_at)),
            ("failed_at".to_string(), format_time(self.failed_at)),
            ("error".to_string(), self.error.clone().unwrap_or_default()),
            ("host".to_string(), self.owner.host.clone()),
            ("port".to_string(), self.owner.port.to_string()),
        ];
        fields.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(fields)
    }

    /// Rebuild a record from the hash read back from a store node.
    pub fn from_fields(job_id: &str, mut fields: HashMap<String, String>) -> QueueResult<Self> {
        let mut take = |name: &str| fields.remove(name).filter(|v| !v.is_empty());
        let corrupt = |field: &str, detail: String| {
            QueueError::Serialization(format!("Job {job_id} has invalid {field}: {detail}"))
        };

        let kind = take("kind").ok_or_else(|| corrupt("kind", "missing".to_string()))?;
        let host = take("host").ok_or_else(|| corrupt("host", "missing".to_string()))?;
        let port = take("port")
            .ok_or_else(|| corrupt("port", "missing".to_string()))?
            .parse::<u16>()
            .map_err(|e| corrupt("port", e.to_string()))?;
        let data = match take("data") {
            Some(raw) => parse_data(&raw),
            None => serde_json::Value::Null,
        };
        let priority = match take("priority") {
            Some(raw) => raw.parse()?,
            None => Priority::default(),
        };
        let timeout = match take("timeout") {
            Some(raw) => parse_seconds(&raw).map_err(|e| corrupt("timeout", e.to_string()))?,
            None => DEFAULT_TIMEOUT,
        };
        let state = take("state");
        let error = take("error");
        let created_at = take("created_at")
            .map(|raw| parse_time(&raw))
            .transpose()
            .map_err(|e| corrupt("created_at", e.to_string()))?;
        let updated_at = take("updated_at")
            .map(|raw| parse_time(&raw))
            .transpose()
            .map_err(|e| corrupt("updated_at", e.to_string()))?;
        let failed_at = take("failed_at")
            .map(|raw| parse_time(&raw))
            .transpose()
            .map_err(|e| corrupt("failed_at", e.to_string()))?;

        Ok(Self {
            kind,
            data,
            priority,
            state,
            timeout,
            created_at,
            updated_at,
            failed_at,
            error,
            owner: NodeAddress::new(host, port),
            extra: fields.into_iter().collect(),
        })
    }

    /// Field value as it is stored in the hash; `None` for null or unknown keys.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "kind" => Some(self.kind.clone()),
            "data" => serde_json::to_string(&self.data).ok(),
            "priority" => Some(self.priority.to_string()),
            "state" => self.state.clone(),
            "timeout" => Some(format_seconds(self.timeout)),
            "created_at" => self.created_at.map(|t| format_time(Some(t))),
            "updated_at" => self.updated_at.map(|t| format_time(Some(t))),
            "failed_at" => self.failed_at.map(|t| format_time(Some(t))),
            "error" => self.error.clone(),
            "host" => Some(self.owner.host.clone()),
            "port" => Some(self.owner.port.to_string()),
            other => self.extra.get(other).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Apply a single field write coming from a worker.
    ///
    /// `state` is not handled here; state changes must go through the index
    /// maintainer. Identity and bookkeeping fields are rejected.
    pub fn set_field(&mut self, key: &str, value: &str) -> QueueResult<()> {
        match key {
            "kind" | "host" | "port" | "created_at" | "updated_at" => {
                return Err(QueueError::InvalidArgument(format!(
                    "Field {key} cannot be modified"
                )));
            }
            "state" => {
                return Err(QueueError::InvalidArgument(
                    "State changes must use transition_to".to_string(),
                ));
            }
            "data" => self.data = parse_data(value),
            "priority" => self.priority = value.parse()?,
            "timeout" => {
                self.timeout = parse_seconds(value)
                    .map_err(|e| QueueError::InvalidArgument(format!("Invalid timeout: {e}")))?
            }
            "failed_at" => {
                self.failed_at = if value.is_empty() {
                    None
                } else {
                    Some(parse_time(value).map_err(|e| {
                        QueueError::InvalidArgument(format!("Invalid failed_at: {e}"))
                    })?)
                }
            }
            "error" => self.error = Some(value.to_string()).filter(|v| !v.is_empty()),
            other => {
                self.extra.insert(other.to_string(), value.to_string());
            }
        }
        Ok(())
    }
}

fn parse_data(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

pub fn format_seconds(duration: Duration) -> String {
    duration.as_secs_f64().to_string()
}

pub fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let secs = raw.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_default()
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}
