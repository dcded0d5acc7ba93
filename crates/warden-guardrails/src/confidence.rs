use warden_config::ConfidenceConfig;

/// Three-way confidence gate for actions already on the approval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceGate {
    /// High enough to execute without consulting a human.
    AutoExecute,
    /// Needs a human decision.
    NeedsApproval,
    /// Too low even to be worth a human's time; refuse.
    Refuse,
}

/// Confidence cutoffs: `auto_execute` above, `approval` below.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceCutoffs {
    pub auto_execute: f64,
    pub approval: f64,
}

impl From<&ConfidenceConfig> for ConfidenceCutoffs {
    fn from(c: &ConfidenceConfig) -> Self {
        Self {
            auto_execute: c.auto_execute,
            approval: c.approval,
        }
    }
}

impl ConfidenceCutoffs {
    pub fn check(&self, confidence: f64) -> ConfidenceGate {
        if confidence >= self.auto_execute {
            ConfidenceGate::AutoExecute
        } else if confidence >= self.approval {
            ConfidenceGate::NeedsApproval
        } else {
            ConfidenceGate::Refuse
        }
    }
}
