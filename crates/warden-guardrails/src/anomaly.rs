use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use tracing::{error, warn};
use uuid::Uuid;
use warden_config::AnomalyConfig;
use warden_core::Severity;

/// What kind of misbehavior was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    CpuSpike,
    MemoryLeak,
    RepeatedFailure,
    ErrorRate,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CpuSpike => "cpu_spike",
            Self::MemoryLeak => "memory_leak",
            Self::RepeatedFailure => "repeated_failure",
            Self::ErrorRate => "error_rate",
        };
        f.write_str(s)
    }
}

/// A detected anomaly. Append-only: events are offered to the safe-mode
/// controller and kept in history, never retracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: Uuid,
    pub kind: AnomalyKind,
    pub detected_at: DateTime<Utc>,
    pub evidence: serde_json::Value,
    pub severity: Severity,
}

impl AnomalyEvent {
    fn new(kind: AnomalyKind, severity: Severity, evidence: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            detected_at: Utc::now(),
            evidence,
            severity,
        }
    }
}

/// One periodic resource reading from the metric-ingestion collaborator.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub taken_at: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_mb: u64,
}

/// Rolling summary for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalySummary {
    pub total_24h: usize,
    pub critical_24h: usize,
    pub recent_error_rate: f64,
    pub last: Option<AnomalyEvent>,
}

/// Threshold configuration. Detection is deterministic and auditable —
/// no statistics beyond counting.
#[derive(Debug, Clone)]
pub struct AnomalyThresholds {
    pub repeated_failures: u32,
    pub cpu_spike_percent: f64,
    pub cpu_spike_samples: u32,
    pub memory_leak_mb: u64,
    pub error_rate: f64,
    pub error_rate_min_samples: usize,
}

impl From<&AnomalyConfig> for AnomalyThresholds {
    fn from(c: &AnomalyConfig) -> Self {
        Self {
            repeated_failures: c.repeated_failures,
            cpu_spike_percent: c.cpu_spike_percent,
            cpu_spike_samples: c.cpu_spike_samples,
            memory_leak_mb: c.memory_leak_mb,
            error_rate: c.error_rate,
            error_rate_min_samples: c.error_rate_min_samples,
        }
    }
}

struct DetectorState {
    failure_streaks: HashMap<String, u32>,
    recent_outcomes: VecDeque<bool>,
    cpu_high_streak: u32,
    memory_baseline_mb: Option<u64>,
    last_sample: Option<ResourceSample>,
    history: Vec<AnomalyEvent>,
}

/// Watches execution outcomes and resource samples, raising an
/// [`AnomalyEvent`] whenever a threshold is crossed.
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    sample_cap: usize,
    state: Mutex<DetectorState>,
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        let sample_cap = thresholds.error_rate_min_samples.max(20);
        Self {
            thresholds,
            sample_cap,
            state: Mutex::new(DetectorState {
                failure_streaks: HashMap::new(),
                recent_outcomes: VecDeque::with_capacity(sample_cap),
                cpu_high_streak: 0,
                memory_baseline_mb: None,
                last_sample: None,
                history: Vec::new(),
            }),
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self::new(AnomalyThresholds::from(config))
    }

    /// Feed one execution outcome. Returns any anomalies it triggered.
    pub fn record_outcome(&self, tool: &str, success: bool) -> Vec<AnomalyEvent> {
        let mut state = self.state.lock();
        let mut events = Vec::new();

        if state.recent_outcomes.len() == self.sample_cap {
            state.recent_outcomes.pop_front();
        }
        state.recent_outcomes.push_back(success);

        let streak = state.failure_streaks.entry(tool.to_string()).or_insert(0);
        if success {
            *streak = 0;
        } else {
            *streak += 1;
            if *streak >= self.thresholds.repeated_failures {
                let streak = *streak;
                error!(tool, streak, "repeated failures detected");
                events.push(AnomalyEvent::new(
                    AnomalyKind::RepeatedFailure,
                    Severity::Critical,
                    json!({ "tool": tool, "streak": streak }),
                ));
            }
        }

        if state.recent_outcomes.len() >= self.thresholds.error_rate_min_samples {
            let failures = state.recent_outcomes.iter().filter(|ok| !**ok).count();
            let rate = failures as f64 / state.recent_outcomes.len() as f64;
            if rate > self.thresholds.error_rate {
                error!(rate, failures, total = state.recent_outcomes.len(), "error rate above threshold");
                events.push(AnomalyEvent::new(
                    AnomalyKind::ErrorRate,
                    Severity::Critical,
                    json!({
                        "rate": rate,
                        "failures": failures,
                        "total": state.recent_outcomes.len(),
                    }),
                ));
            }
        }

        state.history.extend(events.iter().cloned());
        events
    }

    /// Feed one periodic resource reading. Returns any anomalies it
    /// triggered.
    pub fn record_resource_sample(&self, cpu_percent: f64, memory_mb: u64) -> Vec<AnomalyEvent> {
        let mut state = self.state.lock();
        let mut events = Vec::new();

        if cpu_percent > self.thresholds.cpu_spike_percent {
            state.cpu_high_streak += 1;
            if state.cpu_high_streak >= self.thresholds.cpu_spike_samples {
                warn!(cpu_percent, samples = state.cpu_high_streak, "sustained cpu spike");
                events.push(AnomalyEvent::new(
                    AnomalyKind::CpuSpike,
                    Severity::Warning,
                    json!({
                        "cpu_percent": cpu_percent,
                        "threshold": self.thresholds.cpu_spike_percent,
                        "samples": state.cpu_high_streak,
                    }),
                ));
                // Re-arm: a fresh run of hot samples is needed to fire again.
                state.cpu_high_streak = 0;
            }
        } else {
            state.cpu_high_streak = 0;
        }

        match state.memory_baseline_mb {
            None => state.memory_baseline_mb = Some(memory_mb),
            Some(baseline) => {
                let growth = memory_mb.saturating_sub(baseline);
                if growth > self.thresholds.memory_leak_mb {
                    warn!(baseline, current = memory_mb, growth, "memory growth above threshold");
                    events.push(AnomalyEvent::new(
                        AnomalyKind::MemoryLeak,
                        Severity::Warning,
                        json!({
                            "baseline_mb": baseline,
                            "current_mb": memory_mb,
                            "growth_mb": growth,
                        }),
                    ));
                    state.memory_baseline_mb = Some(memory_mb);
                }
            }
        }

        state.last_sample = Some(ResourceSample {
            taken_at: Utc::now(),
            cpu_percent,
            memory_mb,
        });

        state.history.extend(events.iter().cloned());
        events
    }

    /// Raised by the executor when a job burns through its whole retry
    /// budget, independent of the per-tool streak. Only critical once the
    /// attempt count itself reaches the repeated-failure threshold.
    pub fn record_exhausted_retries(&self, tool: &str, attempts: u32) -> AnomalyEvent {
        let severity = if attempts >= self.thresholds.repeated_failures {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let event = AnomalyEvent::new(
            AnomalyKind::RepeatedFailure,
            severity,
            json!({ "tool": tool, "attempts": attempts, "retries_exhausted": true }),
        );
        self.state.lock().history.push(event.clone());
        event
    }

    pub fn last_sample(&self) -> Option<ResourceSample> {
        self.state.lock().last_sample
    }

    /// Anomalies detected in the last `hours` hours.
    pub fn recent(&self, hours: i64) -> Vec<AnomalyEvent> {
        let cutoff = Utc::now() - Duration::hours(hours);
        self.state
            .lock()
            .history
            .iter()
            .filter(|e| e.detected_at > cutoff)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> AnomalySummary {
        let state = self.state.lock();
        let cutoff = Utc::now() - Duration::hours(24);
        let recent: Vec<&AnomalyEvent> = state
            .history
            .iter()
            .filter(|e| e.detected_at > cutoff)
            .collect();
        let failures = state.recent_outcomes.iter().filter(|ok| !**ok).count();
        AnomalySummary {
            total_24h: recent.len(),
            critical_24h: recent
                .iter()
                .filter(|e| e.severity == Severity::Critical)
                .count(),
            recent_error_rate: if state.recent_outcomes.is_empty() {
                0.0
            } else {
                failures as f64 / state.recent_outcomes.len() as f64
            },
            last: recent.last().map(|e| (*e).clone()),
        }
    }
}
