//! # warden-scheduler
//!
//! The scheduler/executor: durable job records, cron due-time evaluation,
//! and the execution pipeline that funnels every action through policy,
//! approval, budget, and safe-mode gates before touching the machine.

pub mod executor;
pub mod gate;
pub mod job;
pub mod schedule;
pub mod store;

pub use executor::{Executor, ExecutorConfig, ExecutorStatus};
pub use gate::{AdmissionGate, Clearance, ResourceCeilings};
pub use job::{Job, JobSpec, JobState};
pub use store::{JobStore, MemoryJobStore, SqliteJobStore};
