use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

/// Events flowing out of the control plane — the structured observability
/// feed external collaborators (dashboards, alerting) subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlEvent {
    // ── Policy ─────────────────────────────────────────────────
    DecisionMade {
        action_id: Uuid,
        tool: String,
        verdict: String,
    },

    // ── Approval lifecycle ─────────────────────────────────────
    ApprovalRequested {
        request_id: Uuid,
        action_id: Uuid,
        tool: String,
    },
    ApprovalGranted {
        request_id: Uuid,
        actor: String,
    },
    ApprovalDenied {
        request_id: Uuid,
        actor: String,
    },
    ApprovalExpired {
        request_id: Uuid,
    },

    // ── Guardrails ─────────────────────────────────────────────
    BudgetRefused {
        scope: String,
        used: f64,
        limit: f64,
    },
    AnomalyDetected {
        event_id: Uuid,
        anomaly_kind: String,
        severity: String,
    },
    SafeModeTripped {
        reason: String,
        actor: String,
    },
    SafeModeResumed {
        actor: String,
    },

    // ── Job lifecycle ──────────────────────────────────────────
    JobSubmitted {
        job_id: String,
    },
    JobStarted {
        job_id: String,
    },
    JobCompleted {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        reason: String,
    },
    JobCancelled {
        job_id: String,
        actor: String,
    },
}

/// A broadcast-based event bus for control-plane pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ControlEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: ControlEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
