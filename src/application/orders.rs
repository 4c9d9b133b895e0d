use super::confirmation::ConfirmationProcessor;
use super::gateways::GatewayRegistry;
use crate::config::EngineSettings;
use crate::domain::channel::{ChannelHints, infer_channel};
use crate::domain::ports::{Checkout, ClockRef, Redemption, TopupRepositoryRef};
use crate::domain::topup::{Topup, TopupDraft, TopupPage, TopupStatus};
use crate::error::{Result, TopupError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTopupRequest {
    pub quote_id: String,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(flatten)]
    pub channel: ChannelHints,
}

/// A freshly created order plus what the client needs to pay it.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTopup {
    pub topup: Topup,
    pub checkout: Checkout,
}

/// Redeems quotes into orders and answers order queries.
///
/// Review decisions are handed to the [`ConfirmationProcessor`], which owns
/// every path that credits the wallet.
pub struct TopupOrderManager {
    repository: TopupRepositoryRef,
    gateways: Arc<GatewayRegistry>,
    confirmations: Arc<ConfirmationProcessor>,
    clock: ClockRef,
    settings: EngineSettings,
}

impl TopupOrderManager {
    pub fn new(
        repository: TopupRepositoryRef,
        gateways: Arc<GatewayRegistry>,
        confirmations: Arc<ConfirmationProcessor>,
        clock: ClockRef,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repository,
            gateways,
            confirmations,
            clock,
            settings,
        }
    }

    /// Turns a quote into a `pending_payment` order.
    ///
    /// Checkout parameters are built before anything is written, so a slow or
    /// failing gateway leaves the quote redeemable and no order behind.
    pub async fn create_topup_from_quote(
        &self,
        user_id: u64,
        request: &CreateTopupRequest,
    ) -> Result<CreatedTopup> {
        let quote_id = request.quote_id.trim();
        if user_id == 0 || quote_id.is_empty() {
            return Err(TopupError::InvalidRequest(
                "user id and quote id are required".into(),
            ));
        }
        let channel = infer_channel(&request.channel);
        if channel.is_mobile() {
            warn!(user_id, quote_id, "Top-up refused on mobile channel");
            return Err(TopupError::TopupNotAllowedOnMobile);
        }

        let now = self.clock.now();
        let quote = self
            .repository
            .get_quote(quote_id)
            .await?
            .ok_or(TopupError::QuoteNotFound)?;
        quote.check_redeemable(user_id, now)?;

        let draft = TopupDraft {
            topup_id: Uuid::new_v4().to_string(),
            channel,
            device_fingerprint: request
                .device_fingerprint
                .as_deref()
                .map(str::trim)
                .filter(|fp| !fp.is_empty())
                .map(String::from),
            created_at: now,
        };
        let checkout = self.checkout(&Topup::from_quote(&quote, draft.clone())).await?;

        let topup = self
            .repository
            .redeem_quote(Redemption {
                quote_id: quote_id.to_string(),
                user_id,
                now,
                draft,
            })
            .await?;

        info!(
            topup_id = %topup.topup_id,
            quote_id,
            user_id,
            gateway = %topup.pricing.gateway_code,
            "Top-up created"
        );
        Ok(CreatedTopup { topup, checkout })
    }

    async fn checkout(&self, draft: &Topup) -> Result<Checkout> {
        let gateway = &draft.pricing.gateway_code;
        let adapter = self
            .gateways
            .get(gateway)
            .ok_or_else(|| TopupError::GatewayDisabled(gateway.clone()))?;

        match tokio::time::timeout(self.settings.checkout_timeout, adapter.build_checkout(draft)).await {
            Ok(Ok(checkout)) => Ok(checkout),
            Ok(Err(e)) => {
                warn!(gateway = %gateway, quote_id = %draft.quote_id, error = %e, "Checkout failed");
                Err(match e {
                    TopupError::Checkout(_) => e,
                    other => TopupError::Checkout(other.to_string()),
                })
            }
            Err(_) => {
                warn!(gateway = %gateway, quote_id = %draft.quote_id, "Checkout timed out");
                Err(TopupError::Checkout(format!("gateway {gateway} timed out")))
            }
        }
    }

    /// The caller's own orders. `page` starts at 1; out-of-range limits fall back to the default.
    pub async fn list_user_topups(
        &self,
        user_id: u64,
        status: Option<TopupStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TopupPage> {
        if user_id == 0 {
            return Err(TopupError::InvalidRequest("user id is required".into()));
        }
        self.repository
            .list_user_topups(user_id, status, page.max(1), self.settings.user_limit(limit))
            .await
    }

    pub async fn list_topups(&self, status: Option<TopupStatus>, limit: u32) -> Result<Vec<Topup>> {
        self.repository
            .list_topups(status, self.settings.admin_limit(limit))
            .await
    }

    /// Every top-up regardless of listing limits, for reports.
    pub async fn all_topups(&self) -> Result<Vec<Topup>> {
        self.repository.list_topups(None, u32::MAX).await
    }

    pub async fn get_topup(&self, topup_id: &str) -> Result<Topup> {
        self.repository
            .get_topup(topup_id)
            .await?
            .ok_or(TopupError::TopupNotFound)
    }

    pub async fn approve_manual_topup(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        self.confirmations.approve(topup_id, admin_id, note).await
    }

    pub async fn reject_topup(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        self.confirmations.reject(topup_id, admin_id, note).await
    }
}
