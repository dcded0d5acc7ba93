use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job lifecycle. Completed, Failed, and Cancelled are terminal for
/// ad-hoc jobs; a scheduled job re-enters Pending after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for JobState {
    type Err = warden_core::WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(warden_core::WardenError::Store(format!(
                "unknown job state: {other}"
            ))),
        }
    }
}

/// What a submitter hands the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Operator-chosen identifier; duplicates are rejected.
    pub id: String,
    /// Tool name the job invokes, e.g. "health_check".
    pub task_type: String,
    /// Cron expression for recurring jobs, `None` for ad-hoc.
    #[serde(default)]
    pub schedule: Option<String>,
    /// 1 = highest, 10 = lowest.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub inputs: Value,
    /// Overrides the scheduler-wide retry limit when set.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_priority() -> u8 {
    5
}

/// A job and its lifecycle state, owned by the scheduler/executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub task_type: String,
    pub schedule: Option<String>,
    pub priority: u8,
    pub inputs: Value,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

impl Job {
    pub fn from_spec(spec: JobSpec, default_max_retries: u32) -> Self {
        Self {
            id: spec.id,
            task_type: spec.task_type,
            schedule: spec.schedule,
            priority: spec.priority,
            inputs: spec.inputs,
            state: JobState::Pending,
            created_at: Utc::now(),
            last_run_at: None,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
