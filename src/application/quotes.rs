use super::pricing::{PackageQuery, PricingCatalog};
use super::risk::RiskClassifier;
use crate::domain::channel::{ChannelHints, infer_channel};
use crate::domain::money::Lkm;
use crate::domain::ports::{ClockRef, TopupRepositoryRef};
use crate::domain::quote::{Quote, QuoteStatus};
use crate::domain::risk::RiskAction;
use crate::error::{Result, TopupError};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub lkm_amount: i64,
    #[serde(flatten)]
    pub selection: PackageQuery,
    #[serde(flatten)]
    pub channel: ChannelHints,
}

/// Issues short-lived, single-use quotes with pricing and risk frozen in.
pub struct QuoteIssuer {
    catalog: Arc<PricingCatalog>,
    classifier: RiskClassifier,
    repository: TopupRepositoryRef,
    clock: ClockRef,
    ttl: TimeDelta,
}

impl QuoteIssuer {
    pub fn new(
        catalog: Arc<PricingCatalog>,
        repository: TopupRepositoryRef,
        clock: ClockRef,
        ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            classifier: RiskClassifier::new(Arc::clone(&repository)),
            repository,
            clock,
            ttl: TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::minutes(10)),
        }
    }

    pub async fn create_quote(&self, user_id: u64, request: &QuoteRequest) -> Result<Quote> {
        if user_id == 0 {
            return Err(TopupError::InvalidRequest("user id is required".into()));
        }
        let channel = infer_channel(&request.channel);
        if channel.is_mobile() {
            warn!(user_id, "Quote refused on mobile channel");
            return Err(TopupError::TopupNotAllowedOnMobile);
        }

        let amount = Lkm::new(request.lkm_amount)?;
        let (config, pricing) = self.catalog.price(amount, &request.selection).await?;
        let now = self.clock.now();
        let risk = self
            .classifier
            .classify(&config, user_id, amount, pricing.region, now)
            .await?;
        if risk.action == RiskAction::Block {
            warn!(user_id, amount = amount.value(), tier = ?risk.tier, "Quote blocked by risk policy");
            return Err(TopupError::TopupBlocked);
        }

        let quote = Quote {
            quote_id: Uuid::new_v4().to_string(),
            user_id,
            receive_lkm: amount,
            pricing,
            risk,
            channel,
            issued_at: now,
            expires_at: now + self.ttl,
            status: QuoteStatus::Issued,
            consumed_at: None,
        };
        self.repository.insert_quote(quote.clone()).await?;

        info!(
            quote_id = %quote.quote_id,
            user_id,
            amount = amount.value(),
            gateway = %quote.pricing.gateway_code,
            total = %quote.pricing.total_pay_amount,
            currency = %quote.pricing.pay_currency,
            risk = %quote.risk.action,
            "Quote issued"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::ports::TopupRepository;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::{InMemoryConfigStore, InMemoryTopupRepository};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn issuer(repo: Arc<InMemoryTopupRepository>) -> QuoteIssuer {
        QuoteIssuer::new(
            Arc::new(PricingCatalog::new(Arc::new(InMemoryConfigStore::new()))),
            repo,
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(600),
        )
    }

    fn request(amount: i64) -> QuoteRequest {
        QuoteRequest {
            lkm_amount: amount,
            selection: PackageQuery {
                region: "cis".into(),
                gateway_code: "yookassa".into(),
                ..PackageQuery::default()
            },
            channel: ChannelHints::explicit("web"),
        }
    }

    #[tokio::test]
    async fn test_quote_freezes_price_and_ttl() {
        let repo = Arc::new(InMemoryTopupRepository::new());
        let quote = issuer(repo.clone()).create_quote(5, &request(500)).await.unwrap();

        assert_eq!(quote.pricing.total_rub, Money::new(dec!(515)));
        assert_eq!(quote.expires_at - quote.issued_at, TimeDelta::minutes(10));
        assert_eq!(quote.risk.action, RiskAction::Auto);
        let stored = repo.get_quote(&quote.quote_id).await.unwrap().unwrap();
        assert_eq!(stored, quote);
    }

    #[tokio::test]
    async fn test_mobile_is_refused_before_persistence() {
        let repo = Arc::new(InMemoryTopupRepository::new());
        let mut req = request(500);
        req.channel = ChannelHints {
            user_agent: Some("okhttp/4.12.0".into()),
            ..ChannelHints::default()
        };
        let result = issuer(repo.clone()).create_quote(5, &req).await;
        assert!(matches!(result, Err(TopupError::TopupNotAllowedOnMobile)));
        assert_eq!(repo.expire_quotes(Utc::now() + TimeDelta::days(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_amounts_and_missing_user() {
        let issuer = issuer(Arc::new(InMemoryTopupRepository::new()));
        assert!(matches!(issuer.create_quote(5, &request(0)).await, Err(TopupError::InvalidAmount)));
        assert!(matches!(issuer.create_quote(5, &request(333)).await, Err(TopupError::InvalidAmount)));
        assert!(matches!(issuer.create_quote(0, &request(500)).await, Err(TopupError::InvalidRequest(_))));
    }
}
