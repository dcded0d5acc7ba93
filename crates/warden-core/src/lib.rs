//! # warden-core
//!
//! Core types, traits, and primitives for the Warden safety control plane.
//! This crate defines the shared vocabulary used by every other crate in
//! the workspace: proposals and decisions, the action-runner seam, the
//! unified error type, the event bus, and the hash-chained audit log.

pub mod action;
pub mod audit;
pub mod error;
pub mod event;

pub use action::{
    ActionDescriptor, ActionRunner, Decision, DryRunReport, ExecutionOutcome, PredictedChange,
    ProposedAction, RiskLevel, Severity, Verdict,
};
pub use audit::{AuditEntry, AuditEvent, AuditLog, AuditRecord, AuditSink};
pub use error::{Result, WardenError};
pub use event::{ControlEvent, EventBus};
