use serde::{Deserialize, Serialize};

/// How a rule identifies the tools it governs. A tagged variant rather
/// than runtime string dispatch: either an exact tool name or the `*`
/// sentinel matching any tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMatcher {
    Exact(String),
    Wildcard,
}

impl ToolMatcher {
    /// Parse a matcher from rule-file text. `"*"` is the wildcard
    /// sentinel; anything else is an exact tool name.
    pub fn parse(raw: &str) -> warden_core::Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(warden_core::WardenError::ConfigValidation {
                field: "rules.tool".into(),
                reason: "matcher must not be empty".into(),
            });
        }
        if raw == "*" {
            Ok(Self::Wildcard)
        } else {
            Ok(Self::Exact(raw.to_string()))
        }
    }

    pub fn matches(&self, tool: &str) -> bool {
        match self {
            Self::Exact(name) => name == tool,
            Self::Wildcard => true,
        }
    }
}

impl std::fmt::Display for ToolMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

/// What a matching rule does with the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Block,
    RequireApproval,
}

/// A compiled policy rule. Rules are ordered; the first match wins.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub matcher: ToolMatcher,
    pub action: RuleAction,
    pub dry_run_first: bool,
    pub backup_required: bool,
    pub reason: String,
}

// ── Rule file schema ───────────────────────────────────────────

/// On-disk rule file (`rules.toml`): a `[defaults]` table and an ordered
/// `[[rules]]` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleFile {
    pub defaults: RuleDefaults,
    pub rules: Vec<RawRule>,
}

/// Applied when no rule matches. The built-ins fail toward human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDefaults {
    pub dry_run: bool,
    pub require_approval: bool,
    pub log_all: bool,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            dry_run: true,
            require_approval: true,
            log_all: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    pub tool: String,
    pub action: RuleAction,
    #[serde(default)]
    pub dry_run_first: bool,
    #[serde(default)]
    pub backup_required: bool,
    pub reason: String,
}

impl RawRule {
    pub fn compile(&self) -> warden_core::Result<PolicyRule> {
        let matcher = ToolMatcher::parse(&self.tool)?;
        if self.reason.trim().is_empty() {
            return Err(warden_core::WardenError::ConfigValidation {
                field: format!("rules.{}", self.tool),
                reason: "every rule needs a reason".into(),
            });
        }
        Ok(PolicyRule {
            matcher,
            action: self.action,
            dry_run_first: self.dry_run_first,
            backup_required: self.backup_required,
            reason: self.reason.clone(),
        })
    }
}
