//! # warden-guardrails
//!
//! The guardrail layer: mechanisms that can refuse execution independent
//! of policy. Budget windows limit operation frequency, the anomaly
//! detector raises events when thresholds are crossed, and the safe-mode
//! controller is the process-wide circuit breaker those events can trip.

pub mod anomaly;
pub mod budget;
pub mod confidence;
pub mod safe_mode;

pub use anomaly::{
    AnomalyDetector, AnomalyEvent, AnomalyKind, AnomalySummary, AnomalyThresholds, ResourceSample,
};
pub use budget::{BudgetLimit, BudgetTracker, BudgetUsage};
pub use confidence::{ConfidenceCutoffs, ConfidenceGate};
pub use safe_mode::{SafeModeController, SafeModePolicy, SafeModeState};
