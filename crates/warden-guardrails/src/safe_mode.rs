use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use warden_config::SafeModeConfig;
use warden_core::{AuditEntry, AuditEvent, AuditLog, ControlEvent, EventBus, Severity};

use crate::anomaly::AnomalyEvent;

/// Snapshot of the process-wide circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeModeState {
    pub active: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_by: Option<String>,
    pub requires_manual_resume: bool,
}

/// How the controller reacts to anomalies and resume requests.
#[derive(Debug, Clone)]
pub struct SafeModePolicy {
    pub auto_trip_severity: Severity,
    pub requires_manual_resume: bool,
    pub cooldown: Duration,
}

impl From<&SafeModeConfig> for SafeModePolicy {
    fn from(c: &SafeModeConfig) -> Self {
        Self {
            auto_trip_severity: c.auto_trip_severity,
            requires_manual_resume: c.requires_manual_resume,
            cooldown: Duration::seconds(c.cooldown_secs as i64),
        }
    }
}

struct Inner {
    state: SafeModeState,
    last_anomaly_at: Option<DateTime<Utc>>,
}

/// The global circuit breaker. While active, every non-read-only execution
/// attempt is refused regardless of the policy verdict — safe mode
/// overrides policy, not the reverse. All transitions happen under one
/// lock so concurrent execution attempts see a consistent flag.
pub struct SafeModeController {
    policy: SafeModePolicy,
    inner: Mutex<Inner>,
    events: EventBus,
    audit: Option<Arc<AuditLog>>,
}

impl SafeModeController {
    pub fn new(policy: SafeModePolicy, events: EventBus) -> Self {
        let requires_manual_resume = policy.requires_manual_resume;
        Self {
            policy,
            inner: Mutex::new(Inner {
                state: SafeModeState {
                    active: false,
                    reason: None,
                    activated_at: None,
                    activated_by: None,
                    requires_manual_resume,
                },
                last_anomaly_at: None,
            }),
            events,
            audit: None,
        }
    }

    /// Like [`Self::new`], but every trip/resume transition is also
    /// appended to the audit log.
    pub fn with_audit(policy: SafeModePolicy, events: EventBus, audit: Arc<AuditLog>) -> Self {
        Self {
            audit: Some(audit),
            ..Self::new(policy, events)
        }
    }

    pub fn from_config(config: &SafeModeConfig, events: EventBus) -> Self {
        Self::new(SafeModePolicy::from(config), events)
    }

    /// Activate safe mode. Idempotent: tripping an active breaker keeps
    /// the original reason.
    pub fn trip(&self, reason: &str, actor: &str) {
        let mut inner = self.inner.lock();
        if inner.state.active {
            return;
        }
        warn!(reason, actor, "SAFE MODE ACTIVATED");
        inner.state.active = true;
        inner.state.reason = Some(reason.to_string());
        inner.state.activated_at = Some(Utc::now());
        inner.state.activated_by = Some(actor.to_string());
        drop(inner);
        if let Some(ref audit) = self.audit {
            audit.append(AuditEntry::new(
                actor,
                AuditEvent::SafeMode {
                    active: true,
                    reason: Some(reason.to_string()),
                },
            ));
        }
        self.events.publish(ControlEvent::SafeModeTripped {
            reason: reason.to_string(),
            actor: actor.to_string(),
        });
    }

    /// Deactivate safe mode. Requires an actor identity when the policy
    /// demands a manual resume. Idempotent: resuming an inactive breaker
    /// is a no-op.
    pub fn resume(&self, actor: &str) -> warden_core::Result<()> {
        if self.policy.requires_manual_resume && actor.trim().is_empty() {
            return Err(warden_core::WardenError::Config(
                "safe-mode resume requires an actor identity".into(),
            ));
        }
        let mut inner = self.inner.lock();
        if !inner.state.active {
            return Ok(());
        }
        info!(actor, "safe mode resumed");
        inner.state.active = false;
        inner.state.reason = None;
        inner.state.activated_at = None;
        inner.state.activated_by = None;
        drop(inner);
        if let Some(ref audit) = self.audit {
            audit.append(AuditEntry::new(
                actor,
                AuditEvent::SafeMode {
                    active: false,
                    reason: None,
                },
            ));
        }
        self.events.publish(ControlEvent::SafeModeResumed {
            actor: actor.to_string(),
        });
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().state.active
    }

    pub fn state(&self) -> SafeModeState {
        self.inner.lock().state.clone()
    }

    /// Offer an anomaly event. Trips when its severity reaches the
    /// auto-trip threshold. Returns whether the breaker is active after
    /// the offer.
    pub fn offer(&self, event: &AnomalyEvent) -> bool {
        {
            let mut inner = self.inner.lock();
            inner.last_anomaly_at = Some(event.detected_at);
        }
        if event.severity >= self.policy.auto_trip_severity {
            self.trip(&event.kind.to_string(), "anomaly_detector");
        }
        self.is_active()
    }

    /// Clear an auto-resumable trip once the anomaly condition has been
    /// quiet for the cooldown period. No-op when the policy requires a
    /// manual resume. Returns true when safe mode was cleared.
    pub fn maybe_auto_resume(&self) -> bool {
        if self.policy.requires_manual_resume {
            return false;
        }
        let now = Utc::now();
        {
            let inner = self.inner.lock();
            if !inner.state.active {
                return false;
            }
            let quiet_since = inner
                .last_anomaly_at
                .or(inner.state.activated_at)
                .unwrap_or(now);
            if now.signed_duration_since(quiet_since) < self.policy.cooldown {
                return false;
            }
        }
        // resume() re-checks activity under the lock.
        let _ = self.resume("auto");
        true
    }
}
