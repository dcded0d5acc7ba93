//! # warden-approval
//!
//! Human-in-the-loop confirmation. Each request is an explicit state
//! machine (`pending -> approved | rejected | expired`) with a dry-run
//! preview attached, queryable by outside layers, released to the waiting
//! execution attempt exactly once, and expired by a detached timer.

pub mod request;
pub mod workflow;

pub use request::{ApprovalOutcome, ApprovalRequest, ApprovalState};
pub use workflow::ApprovalWorkflow;
