use serde::{Deserialize, Serialize};
use std::fmt;

/// How a confirmed payment is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    /// Credit the wallet as soon as the payment is confirmed.
    Auto,
    /// Hold the confirmed payment until an administrator approves it.
    Manual,
    /// Refuse to issue a quote at all.
    Block,
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskAction::Auto => "auto",
            RiskAction::Manual => "manual",
            RiskAction::Block => "block",
        })
    }
}

/// A risk decision frozen at quote issuance, with the tier and reason behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub action: RiskAction,
    pub tier: Option<String>,
    pub reason: Option<String>,
}

impl RiskAssessment {
    pub fn new(action: RiskAction, tier: Option<&str>, reason: Option<&str>) -> Self {
        Self {
            action,
            tier: tier.map(String::from),
            reason: reason.map(String::from),
        }
    }
}

/// What the classifier needs to know about a user's past top-ups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserHistory {
    /// Top-ups created inside the velocity window.
    pub recent_count: u64,
    /// Top-ups ever rejected or sent to manual review.
    pub flagged_count: u64,
    /// Top-ups of any status.
    pub total_count: u64,
}
