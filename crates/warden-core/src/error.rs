use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the entire Warden control plane.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Configuration ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Policy ─────────────────────────────────────────────────
    #[error("action blocked by policy: {tool}: {reason}")]
    PolicyViolation { tool: String, reason: String },

    // ── Approval ───────────────────────────────────────────────
    #[error("approval request expired: {request_id}")]
    ApprovalTimeout { request_id: Uuid },

    #[error("approval request rejected by {actor}: {request_id}")]
    ApprovalRejected { request_id: Uuid, actor: String },

    #[error("approval request already decided: {request_id}")]
    AlreadyDecided { request_id: Uuid },

    #[error("approval request not found: {request_id}")]
    ApprovalNotFound { request_id: Uuid },

    // ── Guardrails ─────────────────────────────────────────────
    #[error("budget exceeded: {scope}: used {used}, limit {limit}")]
    BudgetExceeded {
        scope: String,
        used: f64,
        limit: f64,
    },

    #[error("safe mode active: {reason}")]
    SafeModeBlocked { reason: String },

    // ── Jobs & execution ───────────────────────────────────────
    #[error("job already exists: {job_id}")]
    JobConflict { job_id: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("job already cancelled: {job_id}")]
    AlreadyCancelled { job_id: String },

    #[error("job {job_id} is {state}, transition refused")]
    InvalidJobState { job_id: String, state: String },

    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("no runner registered for tool: {0}")]
    RunnerNotFound(String),

    #[error("action execution failed: {tool}: {reason}")]
    ExecutionFailure { tool: String, reason: String },

    // ── Storage ────────────────────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
