use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Coarse risk classification carried on proposals and approval requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Severity of an anomaly event. Ordered so thresholds can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An action an agent (or a scheduled job) wants to run against the machine.
/// Immutable once created — re-evaluation produces a new [`Decision`], never
/// a mutated proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub id: Uuid,
    pub tool_name: String,
    /// Opaque key/value inputs forwarded to the action runner.
    pub inputs: Value,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub risk_hint: RiskLevel,
}

impl ProposedAction {
    pub fn new(
        tool_name: impl Into<String>,
        inputs: Value,
        requested_by: impl Into<String>,
        risk_hint: RiskLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            inputs,
            requested_by: requested_by.into(),
            requested_at: Utc::now(),
            risk_hint,
        }
    }
}

/// What the policy engine decided for a single proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Block,
    RequireApproval,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::RequireApproval => "require_approval",
        };
        f.write_str(s)
    }
}

/// Outcome of evaluating one [`ProposedAction`] against the rule set.
/// Produced once per evaluation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action_id: Uuid,
    pub verdict: Verdict,
    /// Matcher text of the rule that decided, `None` when the implicit
    /// default applied.
    pub matched_rule: Option<String>,
    pub dry_run_required: bool,
    pub backup_required: bool,
    pub reason: String,
}

/// One predicted side effect reported by a dry run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedChange {
    /// Change category, e.g. "file_write", "service_restart".
    pub kind: String,
    /// What is touched — a path, unit name, process id.
    pub target: String,
    pub detail: String,
}

/// Declared side-effect simulation of an action, shown to approvers and
/// recorded in the audit log. No system state is mutated to produce one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunReport {
    pub summary: String,
    #[serde(default)]
    pub changes: Vec<PredictedChange>,
    /// Affected resources (files, services) for quick display.
    #[serde(default)]
    pub affected: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub reversible: bool,
}

/// Result of actually invoking an action runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output: String,
    /// Optional structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Static facts about a runner the control plane needs for gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Tool name this runner answers to, e.g. "restart_service".
    pub name: String,
    pub description: String,
    /// Read-only runners stay executable while safe mode is active.
    pub read_only: bool,
    /// Whether `dry_run` produces a meaningful preview.
    pub supports_dry_run: bool,
    /// Declared risk of running this tool at all.
    pub risk: RiskLevel,
}

/// The external action-execution collaborator. Warden treats execution as
/// opaque and possibly failing; the only contract is a declared dry-run
/// preview and a result.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    fn descriptor(&self) -> ActionDescriptor;

    /// Carry out the action for real.
    async fn execute(&self, inputs: &Value) -> crate::Result<ExecutionOutcome>;

    /// Simulate the action and report predicted side effects without
    /// mutating system state.
    async fn dry_run(&self, inputs: &Value) -> crate::Result<DryRunReport>;
}
