//! # warden-config
//!
//! Configuration for the Warden control plane: the `warden.toml` schema
//! (approval, scheduler, and guardrail sections), environment overrides,
//! fail-closed validation, and hot reload.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AnomalyConfig, ApprovalConfig, BudgetsConfig, ConfidenceConfig, GuardrailConfig, PolicyConfig,
    SafeModeConfig, SchedulerConfig, ScopeBudget, WardenConfig,
};
