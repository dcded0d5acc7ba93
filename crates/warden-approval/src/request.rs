use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{DryRunReport, ProposedAction, RiskLevel};

/// Lifecycle of an approval request. Approved, Rejected, and Expired are
/// terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A request for a human to confirm an action, carrying everything needed
/// to make an informed call: the dry-run preview, a confidence estimate,
/// and the risk classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub action_id: Uuid,
    pub tool_name: String,
    pub inputs: serde_json::Value,
    pub dry_run: Option<DryRunReport>,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub state: ApprovalState,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    /// Free-text note from the decider (rejection reason, conditions).
    pub note: Option<String>,
}

impl ApprovalRequest {
    pub fn for_action(
        action: &ProposedAction,
        dry_run: Option<DryRunReport>,
        confidence: f64,
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            action_id: action.id,
            tool_name: action.tool_name.clone(),
            inputs: action.inputs.clone(),
            dry_run,
            confidence,
            risk_level: action.risk_hint,
            state: ApprovalState::Pending,
            requested_at: now,
            expires_at: now + timeout,
            decided_at: None,
            decided_by: None,
            note: None,
        }
    }
}

/// What the waiting execution attempt receives when a request resolves.
/// Expiry is treated as a rejection for execution purposes but tagged
/// distinctly for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved { actor: String },
    Rejected { actor: String, note: Option<String> },
    Expired,
}
