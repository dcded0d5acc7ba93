use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use warden_config::WardenConfig;
use warden_core::{
    ActionRunner, AuditEntry, AuditEvent, AuditLog, ControlEvent, EventBus, ExecutionOutcome,
    ProposedAction, WardenError,
};
use serde::Serialize;
use warden_guardrails::{AnomalyDetector, AnomalyEvent, AnomalySummary, SafeModeController};

use crate::gate::{AdmissionGate, Clearance};
use crate::job::{Job, JobSpec, JobState};
use crate::schedule;
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_workers: usize,
    pub tick: Duration,
    pub default_max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Wall-clock ceiling for a single execution attempt.
    pub execution_timeout: Duration,
}

impl ExecutorConfig {
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            max_workers: config.scheduler.max_workers,
            tick: Duration::from_secs(config.scheduler.tick_secs),
            default_max_retries: config.scheduler.default_max_retries,
            backoff_base: Duration::from_secs(config.scheduler.backoff_base_secs),
            backoff_max: Duration::from_secs(config.scheduler.backoff_max_secs),
            execution_timeout: Duration::from_secs(
                config.guardrails.budgets.time_minutes_max * 60,
            ),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

/// Point-in-time operational summary for dashboards and front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStatus {
    pub pending_jobs: usize,
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub pending_approvals: usize,
    pub safe_mode_active: bool,
    pub anomalies: AnomalySummary,
}

/// Pulls due jobs, funnels every execution through the admission gate,
/// invokes the action runner, and records the outcome. Jobs run from a
/// bounded worker pool; the gating sequence for a single action is one
/// logical unit, while approval suspension parks the worker without
/// blocking other jobs' gating checks.
pub struct Executor {
    config: ExecutorConfig,
    gate: AdmissionGate,
    store: Arc<dyn JobStore>,
    runners: RwLock<HashMap<String, Arc<dyn ActionRunner>>>,
    anomaly: Arc<AnomalyDetector>,
    safe_mode: Arc<SafeModeController>,
    audit: Arc<AuditLog>,
    events: EventBus,
    workers: Arc<Semaphore>,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutorConfig,
        gate: AdmissionGate,
        store: Arc<dyn JobStore>,
        anomaly: Arc<AnomalyDetector>,
        safe_mode: Arc<SafeModeController>,
        audit: Arc<AuditLog>,
        events: EventBus,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers));
        Self {
            config,
            gate,
            store,
            runners: RwLock::new(HashMap::new()),
            anomaly,
            safe_mode,
            audit,
            events,
            workers,
        }
    }

    pub fn register_runner(&self, runner: Arc<dyn ActionRunner>) {
        let name = runner.descriptor().name;
        info!(tool = %name, "registered action runner");
        self.runners.write().insert(name, runner);
    }

    pub fn approvals(&self) -> &warden_approval::ApprovalWorkflow {
        self.gate.approvals()
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn status(&self) -> warden_core::Result<ExecutorStatus> {
        Ok(ExecutorStatus {
            pending_jobs: self.store.list(Some(JobState::Pending))?.len(),
            running_jobs: self.store.list(Some(JobState::Running))?.len(),
            completed_jobs: self.store.list(Some(JobState::Completed))?.len(),
            failed_jobs: self.store.list(Some(JobState::Failed))?.len(),
            cancelled_jobs: self.store.list(Some(JobState::Cancelled))?.len(),
            pending_approvals: self.gate.approvals().pending_count(),
            safe_mode_active: self.safe_mode.is_active(),
            anomalies: self.anomaly.summary(),
        })
    }

    // ── Job submission & cancellation ──────────────────────────

    /// Accept a job. Rejected on a duplicate id or a malformed schedule.
    pub fn submit(&self, spec: JobSpec) -> warden_core::Result<String> {
        if spec.id.trim().is_empty() {
            return Err(WardenError::ConfigValidation {
                field: "job.id".into(),
                reason: "must not be empty".into(),
            });
        }
        if let Some(ref expr) = spec.schedule {
            schedule::validate(expr)?;
        }
        let job = Job::from_spec(spec, self.config.default_max_retries);
        let id = job.id.clone();
        self.store.insert(job)?;

        info!(job_id = %id, "job accepted");
        self.audit.append(
            AuditEntry::new(
                "scheduler",
                AuditEvent::JobTransition {
                    from: "none".into(),
                    to: "pending".into(),
                },
            )
            .job(&id),
        );
        self.events
            .publish(ControlEvent::JobSubmitted { job_id: id.clone() });
        Ok(id)
    }

    /// Cancel a pending or running job. Cancelling twice is an error, not
    /// a merge; cancellation of a running job is cooperative — it blocks
    /// the next retry but cannot pre-empt an in-flight dispatch.
    pub fn cancel(&self, job_id: &str, actor: &str) -> warden_core::Result<Job> {
        let prior = self
            .store
            .get(job_id)?
            .map(|j| j.state.to_string())
            .unwrap_or_else(|| "unknown".into());
        let job = self
            .store
            .cancel(job_id, &format!("cancelled by {actor}"))?;

        info!(job_id, actor, "job cancelled");
        self.audit.append(
            AuditEntry::new(
                actor,
                AuditEvent::JobTransition {
                    from: prior,
                    to: "cancelled".into(),
                },
            )
            .job(job_id),
        );
        self.events.publish(ControlEvent::JobCancelled {
            job_id: job_id.to_string(),
            actor: actor.to_string(),
        });
        Ok(job)
    }

    // ── Ad-hoc proposals ───────────────────────────────────────

    /// Gate and execute a one-off agent proposal with no job record.
    /// Refusals surface as errors; there is no retry.
    pub async fn propose(&self, action: ProposedAction) -> warden_core::Result<ExecutionOutcome> {
        let runner = self.runner_for(&action.tool_name)?;
        let clearance = self.gate.admit(&action, runner.as_ref(), None).await?;
        debug!(tool = %action.tool_name, approved_by = ?clearance.approved_by, "proposal admitted");

        let result = tokio::time::timeout(
            self.config.execution_timeout,
            runner.execute(&action.inputs),
        )
        .await
        .unwrap_or_else(|_| {
            Err(WardenError::ExecutionFailure {
                tool: action.tool_name.clone(),
                reason: "execution timed out".into(),
            })
        });

        match result {
            Ok(outcome) => {
                self.audit.append(
                    AuditEntry::new(
                        &action.requested_by,
                        AuditEvent::ExecutionResult {
                            success: true,
                            summary: outcome.output.clone(),
                        },
                    )
                    .action(action.id),
                );
                self.raise_anomalies(self.anomaly.record_outcome(&action.tool_name, true));
                Ok(outcome)
            }
            Err(e) => {
                self.audit.append(
                    AuditEntry::new(
                        &action.requested_by,
                        AuditEvent::ExecutionResult {
                            success: false,
                            summary: e.to_string(),
                        },
                    )
                    .action(action.id),
                );
                self.raise_anomalies(self.anomaly.record_outcome(&action.tool_name, false));
                Err(e)
            }
        }
    }

    // ── Metric ingestion ───────────────────────────────────────

    /// Feed one periodic resource reading from the external metric
    /// collaborator into the anomaly detector.
    pub fn ingest_resource_sample(&self, cpu_percent: f64, memory_mb: u64) {
        self.raise_anomalies(self.anomaly.record_resource_sample(cpu_percent, memory_mb));
    }

    // ── Execution ──────────────────────────────────────────────

    /// On-demand trigger: claim a pending job and run it to a settled
    /// state. Returns the job as the store last recorded it.
    pub async fn execute_now(&self, job_id: &str) -> warden_core::Result<Job> {
        let job = self.store.claim(job_id)?;
        self.mark_started(&job);
        Ok(self.execute_claimed(job).await)
    }

    /// The scheduler loop: scan for due jobs every tick and dispatch each
    /// to a worker slot. Spawn this once as a background task.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.tick);
        info!(tick = ?self.config.tick, workers = self.config.max_workers, "executor started");

        loop {
            ticker.tick().await;
            self.safe_mode.maybe_auto_resume();

            let due = match self.due_jobs() {
                Ok(due) => due,
                Err(e) => {
                    error!(error = %e, "due-job scan failed");
                    continue;
                }
            };

            for job in due {
                // Another worker may have claimed it since the scan.
                let claimed = match self.store.claim(&job.id) {
                    Ok(j) => j,
                    Err(_) => continue,
                };
                self.mark_started(&claimed);

                let Ok(permit) = Arc::clone(&self.workers).acquire_owned().await else {
                    return;
                };
                let executor = Arc::clone(&self);
                tokio::spawn(async move {
                    let _permit = permit;
                    executor.execute_claimed(claimed).await;
                });
            }
        }
    }

    fn due_jobs(&self) -> warden_core::Result<Vec<Job>> {
        let now = Utc::now();
        let pending = self.store.list(Some(JobState::Pending))?;
        Ok(pending
            .into_iter()
            .filter(|job| match schedule::is_due(job, now) {
                Ok(due) => due,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "stored schedule no longer parses, skipping");
                    false
                }
            })
            .collect())
    }

    fn mark_started(&self, job: &Job) {
        self.audit.append(
            AuditEntry::new(
                "executor",
                AuditEvent::JobTransition {
                    from: "pending".into(),
                    to: "running".into(),
                },
            )
            .job(&job.id),
        );
        self.events.publish(ControlEvent::JobStarted {
            job_id: job.id.clone(),
        });
    }

    async fn execute_claimed(&self, job: Job) -> Job {
        let runner = match self.runner_for(&job.task_type) {
            Ok(runner) => runner,
            Err(e) => {
                warn!(job_id = %job.id, tool = %job.task_type, "no runner for job");
                return self.settle(&job, JobState::Failed, Some(e.to_string()), None, 0);
            }
        };

        let descriptor = runner.descriptor();
        let action = ProposedAction::new(
            job.task_type.clone(),
            job.inputs.clone(),
            format!("job:{}", job.id),
            descriptor.risk,
        );

        match self
            .gate
            .admit(&action, runner.as_ref(), Some(&job.id))
            .await
        {
            Ok(clearance) => self.run_with_retries(job, runner, clearance).await,
            Err(e) => self.dispose_gated(job, e),
        }
    }

    /// A gate refusal settles the job without executing anything. Budget
    /// and safe-mode refusals defer a scheduled job to its next fire time;
    /// everything else is failure.
    fn dispose_gated(&self, job: Job, err: WardenError) -> Job {
        let scheduled = job.schedule.is_some();
        let (state, reason) = match &err {
            WardenError::BudgetExceeded { .. } if scheduled => {
                (JobState::Pending, "budget_exceeded".to_string())
            }
            WardenError::SafeModeBlocked { .. } if scheduled => {
                (JobState::Pending, "blocked_safe_mode".to_string())
            }
            WardenError::BudgetExceeded { .. } => (JobState::Failed, "budget_exceeded".into()),
            WardenError::SafeModeBlocked { .. } => (JobState::Failed, "blocked_safe_mode".into()),
            WardenError::ApprovalRejected { .. } => {
                (JobState::Failed, "rejected_by_approver".into())
            }
            WardenError::ApprovalTimeout { .. } => (JobState::Failed, "approval_expired".into()),
            other => (JobState::Failed, other.to_string()),
        };
        info!(job_id = %job.id, %state, reason = %reason, "job refused by admission gate");
        self.settle(&job, state, Some(reason), Some(Utc::now()), job.retry_count)
    }

    async fn run_with_retries(
        &self,
        job: Job,
        runner: Arc<dyn ActionRunner>,
        clearance: Clearance,
    ) -> Job {
        let descriptor = runner.descriptor();
        let tool = job.task_type.clone();
        let mut attempts: u32 = 0;
        debug!(
            job_id = %job.id,
            approved_by = ?clearance.approved_by,
            previewed = clearance.dry_run.is_some(),
            "job admitted"
        );

        loop {
            // Safe mode may have tripped between attempts; a retry is an
            // execution attempt like any other.
            if self.safe_mode.is_active() && !descriptor.read_only {
                return self.dispose_gated(
                    job,
                    WardenError::SafeModeBlocked {
                        reason: self
                            .safe_mode
                            .state()
                            .reason
                            .unwrap_or_else(|| "safe_mode".into()),
                    },
                );
            }

            let result = tokio::time::timeout(
                self.config.execution_timeout,
                runner.execute(&job.inputs),
            )
            .await
            .unwrap_or_else(|_| {
                Err(WardenError::ExecutionFailure {
                    tool: tool.clone(),
                    reason: "execution timed out".into(),
                })
            });

            match result {
                Ok(outcome) => {
                    self.audit.append(
                        AuditEntry::new(
                            "executor",
                            AuditEvent::ExecutionResult {
                                success: true,
                                summary: outcome.output.clone(),
                            },
                        )
                        .job(&job.id),
                    );
                    self.raise_anomalies(self.anomaly.record_outcome(&tool, true));

                    // A scheduled job re-arms; an ad-hoc job is done.
                    let to = if job.schedule.is_some() {
                        JobState::Pending
                    } else {
                        JobState::Completed
                    };
                    let settled = self.settle(&job, to, None, Some(Utc::now()), 0);
                    self.events.publish(ControlEvent::JobCompleted {
                        job_id: job.id.clone(),
                    });
                    return settled;
                }
                Err(e) => {
                    attempts += 1;
                    warn!(job_id = %job.id, attempt = attempts, error = %e, "execution attempt failed");
                    self.audit.append(
                        AuditEntry::new(
                            "executor",
                            AuditEvent::ExecutionResult {
                                success: false,
                                summary: e.to_string(),
                            },
                        )
                        .job(&job.id),
                    );
                    self.raise_anomalies(self.anomaly.record_outcome(&tool, false));

                    // Cooperative cancellation: stop before the next retry.
                    if let Ok(Some(current)) = self.store.get(&job.id) {
                        if current.state == JobState::Cancelled {
                            info!(job_id = %job.id, "job cancelled mid-run, abandoning retries");
                            return current;
                        }
                    }

                    if attempts > job.max_retries {
                        let event = self.anomaly.record_exhausted_retries(&tool, attempts);
                        self.raise_anomalies(vec![event]);
                        return self.settle(
                            &job,
                            JobState::Failed,
                            Some(e.to_string()),
                            Some(Utc::now()),
                            attempts,
                        );
                    }

                    let delay = self.backoff(attempts);
                    debug!(job_id = %job.id, ?delay, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Record the job's settled state. If a cancel won the race while the
    /// job was running, the cancellation stands.
    fn settle(
        &self,
        job: &Job,
        to: JobState,
        error: Option<String>,
        last_run_at: Option<chrono::DateTime<Utc>>,
        retry_count: u32,
    ) -> Job {
        match self
            .store
            .finish(&job.id, to, error.clone(), last_run_at, retry_count)
        {
            Ok(settled) => {
                self.audit.append(
                    AuditEntry::new(
                        "executor",
                        AuditEvent::JobTransition {
                            from: "running".into(),
                            to: to.to_string(),
                        },
                    )
                    .job(&job.id),
                );
                if to == JobState::Failed {
                    self.events.publish(ControlEvent::JobFailed {
                        job_id: job.id.clone(),
                        reason: error.unwrap_or_default(),
                    });
                }
                settled
            }
            Err(_) => {
                // The job left Running underneath us — a concurrent cancel.
                self.store
                    .get(&job.id)
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| job.clone())
            }
        }
    }

    fn raise_anomalies(&self, events: Vec<AnomalyEvent>) {
        for event in events {
            self.audit.append(AuditEntry::new(
                "anomaly_detector",
                AuditEvent::Anomaly {
                    kind: event.kind.to_string(),
                    severity: event.severity.to_string(),
                },
            ));
            self.events.publish(ControlEvent::AnomalyDetected {
                event_id: event.id,
                anomaly_kind: event.kind.to_string(),
                severity: event.severity.to_string(),
            });
            self.safe_mode.offer(&event);
        }
    }

    fn runner_for(&self, tool: &str) -> warden_core::Result<Arc<dyn ActionRunner>> {
        self.runners
            .read()
            .get(tool)
            .cloned()
            .ok_or_else(|| WardenError::RunnerNotFound(tool.to_string()))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.config.backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.config.backoff_max)
    }
}
