use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use warden_core::Severity;

/// Root configuration — maps to `warden.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub policy: PolicyConfig,
    pub approval: ApprovalConfig,
    pub scheduler: SchedulerConfig,
    pub guardrails: GuardrailConfig,
}

// ── Policy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path to the rule file. Relative paths resolve against the directory
    /// holding `warden.toml`.
    pub rules_path: PathBuf,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("rules.toml"),
        }
    }
}

// ── Approval ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds a pending request waits for a human before expiring.
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

// ── Scheduler ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum jobs executing concurrently.
    pub max_workers: usize,
    /// How often the run loop scans for due jobs.
    pub tick_secs: u64,
    /// Retry limit applied when a job spec does not set its own.
    pub default_max_retries: u32,
    /// Exponential backoff base for execution retries.
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            tick_secs: 5,
            default_max_retries: 3,
            backoff_base_secs: 1,
            backoff_max_secs: 60,
        }
    }
}

// ── Guardrails ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub confidence: ConfidenceConfig,
    pub budgets: BudgetsConfig,
    pub anomaly: AnomalyConfig,
    pub safe_mode: SafeModeConfig,
}

/// Confidence cutoffs for actions on the approval path: at or above
/// `auto_execute` no human is consulted, below `approval` the action is
/// refused outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub auto_execute: f64,
    pub approval: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            auto_execute: 0.95,
            approval: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
    /// Fallback operation budget for scopes without an explicit entry.
    /// `default_max_operations = 0` means unlimited.
    pub default_window_secs: u64,
    pub default_max_operations: u32,
    /// Machine-level ceilings; execution is refused while the latest
    /// resource sample sits above them.
    pub cpu_percent_max: f64,
    pub memory_mb_max: u64,
    /// Wall-clock ceiling for a single execution.
    pub time_minutes_max: u64,
    pub scopes: Vec<ScopeBudget>,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            default_window_secs: 3600,
            default_max_operations: 0,
            cpu_percent_max: 85.0,
            memory_mb_max: 4096,
            time_minutes_max: 30,
            scopes: Vec::new(),
        }
    }
}

/// Operation budget for one scope (a tool name or job id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeBudget {
    pub scope: String,
    pub window_secs: u64,
    pub max_operations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Consecutive failures of the same tool before an anomaly fires.
    pub repeated_failures: u32,
    pub cpu_spike_percent: f64,
    /// Consecutive samples above the CPU threshold before an anomaly fires.
    pub cpu_spike_samples: u32,
    /// Memory growth above the first observed baseline, in MB.
    pub memory_leak_mb: u64,
    /// Failure fraction over the rolling outcome sample.
    pub error_rate: f64,
    pub error_rate_min_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            repeated_failures: 3,
            cpu_spike_percent: 90.0,
            cpu_spike_samples: 3,
            memory_leak_mb: 500,
            error_rate: 0.5,
            error_rate_min_samples: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeConfig {
    /// Anomaly severity at or above which safe mode trips automatically.
    pub auto_trip_severity: Severity,
    /// When set, only an explicit operator resume clears safe mode.
    pub requires_manual_resume: bool,
    /// Quiet period before an auto-resume when manual resume is not required.
    pub cooldown_secs: u64,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            auto_trip_severity: Severity::Critical,
            requires_manual_resume: true,
            cooldown_secs: 600,
        }
    }
}

impl WardenConfig {
    /// Validate the configuration. Returns warnings for odd-but-usable
    /// values; returns an error for configurations Warden refuses to run
    /// with (fail closed).
    pub fn validate(&self) -> std::result::Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.scheduler.max_workers == 0 {
            return Err("scheduler.max_workers must be at least 1".into());
        }
        if self.scheduler.tick_secs == 0 {
            return Err("scheduler.tick_secs must be at least 1".into());
        }

        let c = &self.guardrails.confidence;
        if !(0.0..=1.0).contains(&c.auto_execute) || !(0.0..=1.0).contains(&c.approval) {
            return Err("guardrails.confidence cutoffs must be within [0, 1]".into());
        }
        if c.approval > c.auto_execute {
            return Err(
                "guardrails.confidence.approval must not exceed auto_execute".into(),
            );
        }

        for scope in &self.guardrails.budgets.scopes {
            if scope.scope.trim().is_empty() {
                return Err("guardrails.budgets.scopes entries need a scope name".into());
            }
            if scope.window_secs == 0 {
                return Err(format!(
                    "guardrails.budgets scope '{}' has a zero-width window",
                    scope.scope
                ));
            }
        }
        if self.guardrails.budgets.default_max_operations > 0
            && self.guardrails.budgets.default_window_secs == 0
        {
            return Err("guardrails.budgets.default_window_secs must be nonzero".into());
        }

        let a = &self.guardrails.anomaly;
        if a.repeated_failures == 0 {
            return Err("guardrails.anomaly.repeated_failures must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&a.error_rate) {
            return Err("guardrails.anomaly.error_rate must be within [0, 1]".into());
        }

        if self.approval.timeout_secs < 10 {
            warnings.push(format!(
                "approval.timeout_secs = {} leaves humans almost no time to respond",
                self.approval.timeout_secs
            ));
        }
        if !self.guardrails.safe_mode.requires_manual_resume
            && self.guardrails.safe_mode.cooldown_secs == 0
        {
            warnings.push(
                "safe_mode auto-resume with a zero cooldown clears trips immediately".into(),
            );
        }

        Ok(warnings)
    }
}
