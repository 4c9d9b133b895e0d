use crate::domain::config::{Region, TierAction, TopupConfig};
use crate::domain::money::Lkm;
use crate::domain::ports::TopupRepositoryRef;
use crate::domain::risk::{RiskAction, RiskAssessment, UserHistory};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};

/// Decides, once and at issuance, how a top-up will settle.
pub struct RiskClassifier {
    repository: TopupRepositoryRef,
}

impl RiskClassifier {
    pub fn new(repository: TopupRepositoryRef) -> Self {
        Self { repository }
    }

    pub async fn classify(
        &self,
        config: &TopupConfig,
        user_id: u64,
        amount: Lkm,
        region: Region,
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment> {
        let window = Duration::hours(config.risk_policy.velocity_window_hours.max(0));
        let history = self.repository.user_history(user_id, now - window).await?;
        Ok(evaluate(config, amount, region, &history))
    }
}

/// First matching tier wins; with no matching tier the top-up goes to review.
pub fn evaluate(
    config: &TopupConfig,
    amount: Lkm,
    region: Region,
    history: &UserHistory,
) -> RiskAssessment {
    let Some(tier) = config
        .ordered_risk_tiers()
        .into_iter()
        .find(|tier| tier.matches(amount.value(), region))
    else {
        return RiskAssessment::new(RiskAction::Manual, None, Some("no_matching_tier"));
    };

    let name = Some(tier.name.as_str());
    match tier.action {
        TierAction::Auto => RiskAssessment::new(RiskAction::Auto, name, None),
        TierAction::Manual => RiskAssessment::new(RiskAction::Manual, name, Some("tier_manual")),
        TierAction::Block => RiskAssessment::new(RiskAction::Block, name, Some("tier_block")),
        TierAction::Enhanced => {
            let policy = &config.risk_policy;
            // The top-up being evaluated counts towards the window.
            if history.recent_count + 1 > policy.velocity_limit {
                RiskAssessment::new(RiskAction::Manual, name, Some("velocity_limit_exceeded"))
            } else if history.flagged_count > 0 {
                RiskAssessment::new(RiskAction::Manual, name, Some("history_flagged"))
            } else if history.total_count == 0
                && policy
                    .first_purchase_manual_min_lkm
                    .is_some_and(|min| amount.value() >= min)
            {
                RiskAssessment::new(RiskAction::Manual, name, Some("first_purchase_threshold"))
            } else {
                RiskAssessment::new(RiskAction::Auto, name, None)
            }
        }
    }
}
