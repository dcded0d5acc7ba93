//! # warden-policy
//!
//! Declarative policy: an ordered rule list loaded from `rules.toml`, an
//! atomically-swappable rule snapshot, and the first-match-wins engine
//! that turns a [`warden_core::ProposedAction`] into a
//! [`warden_core::Decision`].

pub mod engine;
pub mod rule;
pub mod store;

pub use engine::PolicyEngine;
pub use rule::{PolicyRule, RawRule, RuleAction, RuleDefaults, RuleFile, ToolMatcher};
pub use store::{RuleSet, RuleStore};
