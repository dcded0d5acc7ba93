use std::sync::Arc;
use tracing::{debug, info};

use warden_core::{Decision, ProposedAction, Verdict};

use crate::rule::RuleAction;
use crate::store::RuleStore;

/// Evaluates proposed actions against the active rule snapshot.
/// Deterministic and side-effect-free: the same snapshot and the same
/// proposal always yield the same decision.
pub struct PolicyEngine {
    store: Arc<RuleStore>,
}

impl PolicyEngine {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    pub fn evaluate(&self, action: &ProposedAction) -> Decision {
        let rules = self.store.snapshot();

        // A proposal without a tool name cannot be matched to anything;
        // fail closed rather than fall through to defaults.
        if action.tool_name.trim().is_empty() {
            info!(action_id = %action.id, "rejecting unparseable proposal");
            return Decision {
                action_id: action.id,
                verdict: Verdict::Block,
                matched_rule: None,
                dry_run_required: false,
                backup_required: false,
                reason: "malformed_input".into(),
            };
        }

        match rules.match_rule(&action.tool_name) {
            Some(rule) => {
                let verdict = match rule.action {
                    RuleAction::Allow => Verdict::Allow,
                    RuleAction::Block => Verdict::Block,
                    RuleAction::RequireApproval => Verdict::RequireApproval,
                };
                if rules.defaults.log_all {
                    info!(
                        tool = %action.tool_name,
                        rule = %rule.matcher,
                        verdict = %verdict,
                        "policy decision"
                    );
                } else {
                    debug!(
                        tool = %action.tool_name,
                        rule = %rule.matcher,
                        verdict = %verdict,
                        "policy matched"
                    );
                }
                Decision {
                    action_id: action.id,
                    verdict,
                    matched_rule: Some(rule.matcher.to_string()),
                    dry_run_required: rule.dry_run_first,
                    backup_required: rule.backup_required,
                    reason: rule.reason.clone(),
                }
            }
            None => {
                debug!(tool = %action.tool_name, "no rule matched, defaults apply");
                let verdict = if rules.defaults.require_approval {
                    Verdict::RequireApproval
                } else {
                    Verdict::Allow
                };
                Decision {
                    action_id: action.id,
                    verdict,
                    matched_rule: None,
                    dry_run_required: rules.defaults.dry_run,
                    backup_required: false,
                    reason: "no rule matched, defaults applied".into(),
                }
            }
        }
    }
}
