use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use warden_core::{ControlEvent, DryRunReport, EventBus, ProposedAction};

use crate::request::{ApprovalOutcome, ApprovalRequest, ApprovalState};

struct Entry {
    request: ApprovalRequest,
    /// Taken exactly once, under the workflow lock — whoever transitions
    /// the request first (human or timer) releases the waiter; the loser
    /// finds the sender gone.
    release: Option<oneshot::Sender<ApprovalOutcome>>,
}

struct Inner {
    pending: HashMap<Uuid, Entry>,
    history: Vec<ApprovalRequest>,
}

/// The approval workflow: holds actions awaiting human confirmation,
/// releases the waiting execution attempt at most once, and expires
/// unanswered requests from a detached timer rather than by blocking a
/// worker.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
    events: EventBus,
}

impl ApprovalWorkflow {
    pub fn new(timeout: Duration, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: HashMap::new(),
                history: Vec::new(),
            })),
            timeout,
            events,
        }
    }

    pub fn from_config(config: &warden_config::ApprovalConfig, events: EventBus) -> Self {
        Self::new(Duration::from_secs(config.timeout_secs), events)
    }

    /// Register a request for the given action and return it along with
    /// the receiver the execution attempt parks on. Spawns the expiry
    /// timer; must be called inside a tokio runtime.
    pub fn submit(
        &self,
        action: &ProposedAction,
        dry_run: Option<DryRunReport>,
        confidence: f64,
    ) -> (ApprovalRequest, oneshot::Receiver<ApprovalOutcome>) {
        let chrono_timeout =
            chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        let request = ApprovalRequest::for_action(action, dry_run, confidence, chrono_timeout);
        let (tx, rx) = oneshot::channel();

        info!(
            request_id = %request.id,
            tool = %request.tool_name,
            risk = %request.risk_level,
            confidence,
            "approval requested"
        );

        self.inner.lock().pending.insert(
            request.id,
            Entry {
                request: request.clone(),
                release: Some(tx),
            },
        );
        self.events.publish(ControlEvent::ApprovalRequested {
            request_id: request.id,
            action_id: request.action_id,
            tool: request.tool_name.clone(),
        });

        let workflow = self.clone();
        let id = request.id;
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            workflow.expire(id);
        });

        (request, rx)
    }

    pub fn approve(&self, id: Uuid, actor: &str) -> warden_core::Result<ApprovalRequest> {
        self.decide(id, ApprovalState::Approved, actor, None)
    }

    pub fn reject(
        &self,
        id: Uuid,
        actor: &str,
        note: Option<String>,
    ) -> warden_core::Result<ApprovalRequest> {
        self.decide(id, ApprovalState::Rejected, actor, note)
    }

    /// Withdraw a still-pending request (e.g. the underlying job was
    /// cancelled). Resolves to a rejection; racing against a concurrent
    /// decision yields `AlreadyDecided` for the loser.
    pub fn cancel(&self, id: Uuid, actor: &str) -> warden_core::Result<ApprovalRequest> {
        self.decide(id, ApprovalState::Rejected, actor, Some("cancelled".into()))
    }

    fn decide(
        &self,
        id: Uuid,
        state: ApprovalState,
        actor: &str,
        note: Option<String>,
    ) -> warden_core::Result<ApprovalRequest> {
        let mut inner = self.inner.lock();
        let Some(mut entry) = inner.pending.remove(&id) else {
            if inner.history.iter().any(|r| r.id == id) {
                return Err(warden_core::WardenError::AlreadyDecided { request_id: id });
            }
            return Err(warden_core::WardenError::ApprovalNotFound { request_id: id });
        };

        entry.request.state = state;
        entry.request.decided_at = Some(chrono::Utc::now());
        entry.request.decided_by = Some(actor.to_string());
        entry.request.note = note.clone();

        let outcome = match state {
            ApprovalState::Approved => ApprovalOutcome::Approved {
                actor: actor.to_string(),
            },
            _ => ApprovalOutcome::Rejected {
                actor: actor.to_string(),
                note,
            },
        };
        if let Some(tx) = entry.release.take() {
            let _ = tx.send(outcome);
        }

        let request = entry.request.clone();
        inner.history.push(entry.request);
        drop(inner);

        info!(request_id = %id, state = %state, actor, "approval decided");
        match state {
            ApprovalState::Approved => self.events.publish(ControlEvent::ApprovalGranted {
                request_id: id,
                actor: actor.to_string(),
            }),
            _ => self.events.publish(ControlEvent::ApprovalDenied {
                request_id: id,
                actor: actor.to_string(),
            }),
        }
        Ok(request)
    }

    /// Timer-driven expiry. A request already decided by a human is left
    /// alone — the timer simply lost the race.
    fn expire(&self, id: Uuid) {
        let mut inner = self.inner.lock();
        let Some(mut entry) = inner.pending.remove(&id) else {
            return;
        };
        entry.request.state = ApprovalState::Expired;
        entry.request.decided_at = Some(chrono::Utc::now());
        if let Some(tx) = entry.release.take() {
            let _ = tx.send(ApprovalOutcome::Expired);
        }
        inner.history.push(entry.request);
        drop(inner);

        debug!(request_id = %id, "approval request expired");
        self.events
            .publish(ControlEvent::ApprovalExpired { request_id: id });
    }

    /// Requests still awaiting a decision, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let inner = self.inner.lock();
        let mut requests: Vec<ApprovalRequest> =
            inner.pending.values().map(|e| e.request.clone()).collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Look up a request wherever it lives.
    pub fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        let inner = self.inner.lock();
        inner
            .pending
            .get(&id)
            .map(|e| e.request.clone())
            .or_else(|| inner.history.iter().find(|r| r.id == id).cloned())
    }

    /// Decided requests, newest first, paginated. `approved_only` filters
    /// to requests a human granted.
    pub fn history(
        &self,
        page: usize,
        per_page: usize,
        approved_only: bool,
    ) -> Vec<ApprovalRequest> {
        let inner = self.inner.lock();
        inner
            .history
            .iter()
            .rev()
            .filter(|r| !approved_only || r.state == ApprovalState::Approved)
            .skip(page.saturating_mul(per_page))
            .take(per_page)
            .cloned()
            .collect()
    }
}
