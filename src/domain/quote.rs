use super::channel::Channel;
use super::config::Region;
use super::money::{Lkm, Money};
use super::risk::RiskAssessment;
use crate::error::TopupError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fully resolved price for one LKM amount.
///
/// Reference-currency amounts are rounded to kopecks and the payable amount to
/// the minor units of the pay currency. Once frozen into a quote these values
/// are copied, never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub gateway_code: String,
    pub payment_method: String,
    pub region: Region,
    pub pay_currency: String,
    /// Reference-currency units per one unit of the pay currency.
    pub fx_rate: Decimal,
    /// Decimal places the payable amount was rounded to.
    pub pay_minor_units: u32,
    pub nominal_rub_per_lkm: Decimal,
    pub nominal_rub: Money,
    pub processing_cost_rub: Money,
    pub total_rub: Money,
    pub total_pay_amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Issued,
    Consumed,
    /// Marked by the housekeeping sweep; redemption checks the timestamp regardless.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub user_id: u64,
    pub receive_lkm: Lkm,
    #[serde(flatten)]
    pub pricing: PriceBreakdown,
    pub risk: RiskAssessment,
    pub channel: Channel,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: QuoteStatus,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QuoteStatus::Expired || now > self.expires_at
    }

    /// Checks whether `user_id` may redeem this quote at `now`.
    ///
    /// Another user's quote is reported as missing so quote ids cannot be enumerated.
    pub fn check_redeemable(&self, user_id: u64, now: DateTime<Utc>) -> Result<(), TopupError> {
        if self.user_id != user_id {
            return Err(TopupError::QuoteNotFound);
        }
        if self.status == QuoteStatus::Consumed {
            return Err(TopupError::QuoteAlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(TopupError::QuoteExpired);
        }
        Ok(())
    }

    pub fn consume(&mut self, now: DateTime<Utc>) {
        self.status = QuoteStatus::Consumed;
        self.consumed_at = Some(now);
    }
}
