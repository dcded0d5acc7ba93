use std::sync::Arc;
use tracing::{info, warn};

use warden_approval::{ApprovalOutcome, ApprovalWorkflow};
use warden_config::BudgetsConfig;
use warden_core::{
    ActionRunner, AuditEntry, AuditEvent, AuditLog, ControlEvent, Decision, DryRunReport,
    EventBus, ProposedAction, RiskLevel, Verdict,
};
use warden_guardrails::{
    AnomalyDetector, BudgetTracker, ConfidenceCutoffs, ConfidenceGate, SafeModeController,
};
use warden_policy::PolicyEngine;

/// Machine-level ceilings checked against the latest resource sample.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCeilings {
    pub cpu_percent_max: f64,
    pub memory_mb_max: u64,
}

impl From<&BudgetsConfig> for ResourceCeilings {
    fn from(c: &BudgetsConfig) -> Self {
        Self {
            cpu_percent_max: c.cpu_percent_max,
            memory_mb_max: c.memory_mb_max,
        }
    }
}

/// Everything an execution attempt needs once admission passes.
#[derive(Debug, Clone)]
pub struct Clearance {
    pub decision: Decision,
    pub dry_run: Option<DryRunReport>,
    /// Who let the action through the approval path, when one was taken.
    pub approved_by: Option<String>,
}

/// Admission control for one action: policy, then approval when required,
/// then budget and safe-mode gates. One logical sequence per action; no
/// guardrail lock is held while a human decision is pending.
pub struct AdmissionGate {
    policy: PolicyEngine,
    budgets: Arc<BudgetTracker>,
    safe_mode: Arc<SafeModeController>,
    approvals: ApprovalWorkflow,
    anomaly: Arc<AnomalyDetector>,
    cutoffs: ConfidenceCutoffs,
    ceilings: ResourceCeilings,
    audit: Arc<AuditLog>,
    events: EventBus,
}

impl AdmissionGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy: PolicyEngine,
        budgets: Arc<BudgetTracker>,
        safe_mode: Arc<SafeModeController>,
        approvals: ApprovalWorkflow,
        anomaly: Arc<AnomalyDetector>,
        cutoffs: ConfidenceCutoffs,
        ceilings: ResourceCeilings,
        audit: Arc<AuditLog>,
        events: EventBus,
    ) -> Self {
        Self {
            policy,
            budgets,
            safe_mode,
            approvals,
            anomaly,
            cutoffs,
            ceilings,
            audit,
            events,
        }
    }

    pub fn approvals(&self) -> &ApprovalWorkflow {
        &self.approvals
    }

    /// Run the full admission sequence for one action. `job_id` ties audit
    /// records back to the owning job when there is one.
    pub async fn admit(
        &self,
        action: &ProposedAction,
        runner: &dyn ActionRunner,
        job_id: Option<&str>,
    ) -> warden_core::Result<Clearance> {
        let descriptor = runner.descriptor();
        let tag = |entry: AuditEntry| {
            let entry = entry.action(action.id);
            match job_id {
                Some(id) => entry.job(id),
                None => entry,
            }
        };

        // 1. Policy.
        let decision = self.policy.evaluate(action);
        self.audit.append(tag(AuditEntry::new(
            &action.requested_by,
            AuditEvent::Decision {
                verdict: decision.verdict.to_string(),
                matched_rule: decision.matched_rule.clone(),
                reason: decision.reason.clone(),
            },
        )));
        self.events.publish(ControlEvent::DecisionMade {
            action_id: action.id,
            tool: action.tool_name.clone(),
            verdict: decision.verdict.to_string(),
        });
        if decision.verdict == Verdict::Block {
            info!(tool = %action.tool_name, reason = %decision.reason, "action blocked by policy");
            return Err(warden_core::WardenError::PolicyViolation {
                tool: action.tool_name.clone(),
                reason: decision.reason.clone(),
            });
        }

        let mut dry_run = None;
        let mut approved_by = None;

        // 2. Approval path.
        if decision.verdict == Verdict::RequireApproval {
            let risk = action.risk_hint.max(descriptor.risk);
            let confidence = baseline_confidence(risk);
            match self.cutoffs.check(confidence) {
                ConfidenceGate::Refuse => {
                    let reason = format!("confidence {confidence:.2} below approval floor");
                    self.audit.append(tag(AuditEntry::new(
                        "admission_gate",
                        AuditEvent::GateRefusal {
                            gate: "confidence".into(),
                            reason: reason.clone(),
                        },
                    )));
                    return Err(warden_core::WardenError::PolicyViolation {
                        tool: action.tool_name.clone(),
                        reason,
                    });
                }
                ConfidenceGate::AutoExecute => {
                    self.audit.append(tag(AuditEntry::new(
                        "admission_gate",
                        AuditEvent::ApprovalOutcome {
                            request_id: action.id,
                            state: "approved".into(),
                            decided_by: Some("auto".into()),
                        },
                    )));
                    approved_by = Some("auto".to_string());
                }
                ConfidenceGate::NeedsApproval => {
                    if decision.dry_run_required && descriptor.supports_dry_run {
                        match runner.dry_run(&action.inputs).await {
                            Ok(report) => {
                                self.audit.append(tag(AuditEntry::new(
                                    "admission_gate",
                                    AuditEvent::DryRun {
                                        summary: report.summary.clone(),
                                    },
                                )));
                                dry_run = Some(report);
                            }
                            Err(e) => {
                                warn!(tool = %action.tool_name, error = %e, "dry-run preview failed");
                            }
                        }
                    }

                    let (request, rx) = self.approvals.submit(action, dry_run.clone(), confidence);
                    // Park here without holding any lock; the workflow's
                    // timer guarantees the receiver resolves.
                    let outcome = rx.await.unwrap_or(ApprovalOutcome::Expired);
                    match outcome {
                        ApprovalOutcome::Approved { actor } => {
                            self.audit.append(tag(AuditEntry::new(
                                &actor,
                                AuditEvent::ApprovalOutcome {
                                    request_id: request.id,
                                    state: "approved".into(),
                                    decided_by: Some(actor.clone()),
                                },
                            )));
                            approved_by = Some(actor);
                        }
                        ApprovalOutcome::Rejected { actor, note: _ } => {
                            self.audit.append(tag(AuditEntry::new(
                                &actor,
                                AuditEvent::ApprovalOutcome {
                                    request_id: request.id,
                                    state: "rejected".into(),
                                    decided_by: Some(actor.clone()),
                                },
                            )));
                            return Err(warden_core::WardenError::ApprovalRejected {
                                request_id: request.id,
                                actor,
                            });
                        }
                        ApprovalOutcome::Expired => {
                            self.audit.append(tag(AuditEntry::new(
                                "approval_timer",
                                AuditEvent::ApprovalOutcome {
                                    request_id: request.id,
                                    state: "expired".into(),
                                    decided_by: None,
                                },
                            )));
                            return Err(warden_core::WardenError::ApprovalTimeout {
                                request_id: request.id,
                            });
                        }
                    }
                }
            }
        }

        // 3. Budget window for this scope.
        let scope = action.tool_name.clone();
        if !self.budgets.try_consume(&scope, 1) {
            let (used, limit) = self
                .budgets
                .usage(&scope)
                .map(|u| (u.current_count as f64, u.max_operations as f64))
                .unwrap_or((0.0, 0.0));
            self.audit.append(tag(AuditEntry::new(
                "admission_gate",
                AuditEvent::GateRefusal {
                    gate: "budget".into(),
                    reason: format!("{used} of {limit} operations used in window"),
                },
            )));
            self.events.publish(ControlEvent::BudgetRefused {
                scope: scope.clone(),
                used,
                limit,
            });
            return Err(warden_core::WardenError::BudgetExceeded { scope, used, limit });
        }

        // Machine-level ceilings from the latest resource sample.
        if let Some(sample) = self.anomaly.last_sample() {
            if sample.cpu_percent > self.ceilings.cpu_percent_max {
                let reason = format!(
                    "cpu at {:.1}%, ceiling {:.1}%",
                    sample.cpu_percent, self.ceilings.cpu_percent_max
                );
                self.audit.append(tag(AuditEntry::new(
                    "admission_gate",
                    AuditEvent::GateRefusal {
                        gate: "budget".into(),
                        reason,
                    },
                )));
                return Err(warden_core::WardenError::BudgetExceeded {
                    scope: "cpu_percent".into(),
                    used: sample.cpu_percent,
                    limit: self.ceilings.cpu_percent_max,
                });
            }
            if sample.memory_mb > self.ceilings.memory_mb_max {
                let reason = format!(
                    "memory at {}MB, ceiling {}MB",
                    sample.memory_mb, self.ceilings.memory_mb_max
                );
                self.audit.append(tag(AuditEntry::new(
                    "admission_gate",
                    AuditEvent::GateRefusal {
                        gate: "budget".into(),
                        reason,
                    },
                )));
                return Err(warden_core::WardenError::BudgetExceeded {
                    scope: "memory_mb".into(),
                    used: sample.memory_mb as f64,
                    limit: self.ceilings.memory_mb_max as f64,
                });
            }
        }

        // 4. Safe mode overrides policy, not the reverse.
        if self.safe_mode.is_active() && !descriptor.read_only {
            let reason = self
                .safe_mode
                .state()
                .reason
                .unwrap_or_else(|| "safe_mode".into());
            self.audit.append(tag(AuditEntry::new(
                "admission_gate",
                AuditEvent::GateRefusal {
                    gate: "safe_mode".into(),
                    reason: "blocked_safe_mode".into(),
                },
            )));
            return Err(warden_core::WardenError::SafeModeBlocked { reason });
        }

        // Dry-run-first preview for actions that skipped the approval path.
        if dry_run.is_none() && decision.dry_run_required && descriptor.supports_dry_run {
            match runner.dry_run(&action.inputs).await {
                Ok(report) => {
                    self.audit.append(tag(AuditEntry::new(
                        "admission_gate",
                        AuditEvent::DryRun {
                            summary: report.summary.clone(),
                        },
                    )));
                    dry_run = Some(report);
                }
                Err(e) => {
                    warn!(tool = %action.tool_name, error = %e, "dry-run preview failed");
                }
            }
        }

        Ok(Clearance {
            decision,
            dry_run,
            approved_by,
        })
    }
}

/// A proposal's standing before any human weighs in, derived from its
/// risk classification.
fn baseline_confidence(risk: RiskLevel) -> f64 {
    match risk {
        RiskLevel::Low => 0.9,
        RiskLevel::Medium => 0.7,
        RiskLevel::High => 0.55,
        RiskLevel::Critical => 0.3,
    }
}
