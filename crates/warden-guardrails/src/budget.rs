use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;
use warden_config::BudgetsConfig;

/// Operation budget for one scope: at most `max_operations` per fixed
/// window.
#[derive(Debug, Clone, Copy)]
pub struct BudgetLimit {
    pub window: Duration,
    pub max_operations: u32,
}

impl BudgetLimit {
    pub fn per_window(max_operations: u32, window: Duration) -> Self {
        Self {
            window,
            max_operations,
        }
    }
}

/// Point-in-time view of one scope's window, for observability.
#[derive(Debug, Clone)]
pub struct BudgetUsage {
    pub scope: String,
    pub current_count: u32,
    pub max_operations: u32,
    pub window_started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: DateTime<Utc>,
}

/// Fixed-window operation counters, keyed by scope (tool name or job id).
/// The invariant `current_count <= max_operations` holds because
/// consumption is refused, never clamped after the fact. Window rollover
/// is lazy: the first call past the boundary resets the counter before
/// evaluating.
pub struct BudgetTracker {
    limits: DashMap<String, BudgetLimit>,
    default_limit: Option<BudgetLimit>,
    windows: DashMap<String, Window>,
}

impl BudgetTracker {
    pub fn new(default_limit: Option<BudgetLimit>) -> Self {
        Self {
            limits: DashMap::new(),
            default_limit,
            windows: DashMap::new(),
        }
    }

    /// Build a tracker from the `[guardrails.budgets]` config section.
    /// `default_max_operations = 0` means scopes without an entry are
    /// unlimited.
    pub fn from_config(config: &BudgetsConfig) -> Self {
        let default_limit = (config.default_max_operations > 0).then(|| {
            BudgetLimit::per_window(
                config.default_max_operations,
                Duration::seconds(config.default_window_secs as i64),
            )
        });
        let tracker = Self::new(default_limit);
        for scope in &config.scopes {
            tracker.set_limit(
                &scope.scope,
                BudgetLimit::per_window(
                    scope.max_operations,
                    Duration::seconds(scope.window_secs as i64),
                ),
            );
        }
        tracker
    }

    pub fn set_limit(&self, scope: &str, limit: BudgetLimit) {
        self.limits.insert(scope.to_string(), limit);
    }

    /// Try to consume `n` operations from the scope's current window.
    /// Returns false when the window is exhausted; the caller decides
    /// whether to retry in a later window.
    pub fn try_consume(&self, scope: &str, n: u32) -> bool {
        let Some(limit) = self
            .limits
            .get(scope)
            .map(|l| *l)
            .or(self.default_limit)
        else {
            return true;
        };

        let now = Utc::now();
        let mut window = self.windows.entry(scope.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if now.signed_duration_since(window.started_at) >= limit.window {
            window.count = 0;
            window.started_at = now;
        }

        if window.count + n > limit.max_operations {
            warn!(
                scope,
                used = window.count,
                limit = limit.max_operations,
                "budget window exhausted"
            );
            return false;
        }
        window.count += n;
        true
    }

    /// Configured limit for a scope, if any.
    pub fn limit(&self, scope: &str) -> Option<BudgetLimit> {
        self.limits.get(scope).map(|l| *l).or(self.default_limit)
    }

    /// Usage snapshot for a scope that has consumed at least once.
    pub fn usage(&self, scope: &str) -> Option<BudgetUsage> {
        let limit = self.limit(scope)?;
        let window = self.windows.get(scope)?;
        Some(BudgetUsage {
            scope: scope.to_string(),
            current_count: window.count,
            max_operations: limit.max_operations,
            window_started_at: window.started_at,
        })
    }
}
