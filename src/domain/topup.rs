use super::channel::Channel;
use super::money::Lkm;
use super::quote::{PriceBreakdown, Quote};
use super::risk::{RiskAction, RiskAssessment};
use crate::error::TopupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopupStatus {
    PendingPayment,
    Paid,
    AwaitingManualReview,
    Approved,
    Credited,
    Rejected,
}

impl TopupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopupStatus::PendingPayment => "pending_payment",
            TopupStatus::Paid => "paid",
            TopupStatus::AwaitingManualReview => "awaiting_manual_review",
            TopupStatus::Approved => "approved",
            TopupStatus::Credited => "credited",
            TopupStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<TopupStatus> {
        match raw.trim().to_lowercase().as_str() {
            "pending_payment" => Some(TopupStatus::PendingPayment),
            "paid" => Some(TopupStatus::Paid),
            "awaiting_manual_review" | "manual_review" => Some(TopupStatus::AwaitingManualReview),
            "approved" => Some(TopupStatus::Approved),
            "credited" => Some(TopupStatus::Credited),
            "rejected" => Some(TopupStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TopupStatus::Credited | TopupStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: TopupStatus) -> bool {
        use TopupStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid)
                | (PendingPayment, Rejected)
                | (Paid, Credited)
                | (Paid, AwaitingManualReview)
                | (AwaitingManualReview, Approved)
                | (AwaitingManualReview, Rejected)
                | (Approved, Credited)
        )
    }
}

impl fmt::Display for TopupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a top-up's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: TopupStatus,
    pub to: TopupStatus,
    pub at: DateTime<Utc>,
    /// `gateway:<code>` or `admin:<id>`.
    pub actor: String,
}

/// Values the order manager supplies when turning a quote into a top-up.
#[derive(Debug, Clone)]
pub struct TopupDraft {
    pub topup_id: String,
    pub channel: Channel,
    pub device_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a confirmed payment leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    CreditNow,
    HoldForReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topup {
    pub topup_id: String,
    pub quote_id: String,
    pub user_id: u64,
    pub receive_lkm: Lkm,
    #[serde(flatten)]
    pub pricing: PriceBreakdown,
    pub channel: Channel,
    pub device_fingerprint: Option<String>,
    pub status: TopupStatus,
    pub risk: RiskAssessment,
    pub external_payment_id: Option<String>,
    pub ledger_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub credited_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<u64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_note: Option<String>,
    pub history: Vec<StatusChange>,
}

impl Topup {
    /// Builds a pending order, copying every frozen price and risk field from the quote.
    pub fn from_quote(quote: &Quote, draft: TopupDraft) -> Self {
        Self {
            topup_id: draft.topup_id,
            quote_id: quote.quote_id.clone(),
            user_id: quote.user_id,
            receive_lkm: quote.receive_lkm,
            pricing: quote.pricing.clone(),
            channel: draft.channel,
            device_fingerprint: draft.device_fingerprint,
            status: TopupStatus::PendingPayment,
            risk: quote.risk.clone(),
            external_payment_id: None,
            ledger_transaction_id: None,
            created_at: draft.created_at,
            updated_at: draft.created_at,
            paid_at: None,
            credited_at: None,
            reviewed_by: None,
            reviewed_at: None,
            review_note: None,
            history: Vec::new(),
        }
    }

    /// The ledger idempotency key for this top-up.
    pub fn ledger_key(&self) -> String {
        format!("lkm_topup:{}", self.topup_id)
    }

    fn transition(&mut self, to: TopupStatus, at: DateTime<Utc>, actor: &str) -> Result<(), TopupError> {
        if !self.status.can_transition_to(to) {
            return Err(TopupError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.history.push(StatusChange {
            from: self.status,
            to,
            at,
            actor: actor.to_string(),
        });
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    /// Records a successful payment and decides how it settles.
    ///
    /// Auto top-ups stop at `paid` and must be credited next; manual ones move
    /// straight on to `awaiting_manual_review`. A top-up already awaiting review
    /// stays there, so repeated confirmations never bypass the review gate.
    pub fn confirm_payment(
        &mut self,
        external_payment_id: Option<String>,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<Settlement, TopupError> {
        if let Some(external) = external_payment_id.filter(|id| !id.is_empty()) {
            self.external_payment_id = Some(external);
        }
        if self.status == TopupStatus::AwaitingManualReview {
            self.updated_at = at;
            return Ok(Settlement::HoldForReview);
        }

        self.transition(TopupStatus::Paid, at, actor)?;
        self.paid_at = Some(at);
        match self.risk.action {
            RiskAction::Auto => Ok(Settlement::CreditNow),
            RiskAction::Manual | RiskAction::Block => {
                self.transition(TopupStatus::AwaitingManualReview, at, actor)?;
                Ok(Settlement::HoldForReview)
            }
        }
    }

    pub fn mark_credited(
        &mut self,
        ledger_transaction_id: String,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<(), TopupError> {
        self.transition(TopupStatus::Credited, at, actor)?;
        self.credited_at = Some(at);
        self.ledger_transaction_id = Some(ledger_transaction_id);
        Ok(())
    }

    /// Moves a reviewed top-up to `approved`; crediting follows.
    pub fn approve(&mut self, admin_id: u64, note: &str, at: DateTime<Utc>) -> Result<(), TopupError> {
        if self.status != TopupStatus::AwaitingManualReview {
            return Err(TopupError::TopupNotAwaitingReview(self.status));
        }
        self.transition(TopupStatus::Approved, at, &admin_actor(admin_id))?;
        self.record_review(admin_id, note, at);
        Ok(())
    }

    pub fn reject_review(&mut self, admin_id: u64, note: &str, at: DateTime<Utc>) -> Result<(), TopupError> {
        if self.status != TopupStatus::AwaitingManualReview {
            return Err(TopupError::TopupNotAwaitingReview(self.status));
        }
        self.transition(TopupStatus::Rejected, at, &admin_actor(admin_id))?;
        self.record_review(admin_id, note, at);
        Ok(())
    }

    /// Rejects after the gateway reported the payment as failed.
    ///
    /// Only an unpaid order can fail. Once a payment has been confirmed, a late
    /// failure leaves the order untouched.
    pub fn fail_payment(
        &mut self,
        external_payment_id: Option<String>,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Result<(), TopupError> {
        if self.status != TopupStatus::PendingPayment {
            return Ok(());
        }
        if let Some(external) = external_payment_id.filter(|id| !id.is_empty()) {
            self.external_payment_id = Some(external);
        }
        self.transition(TopupStatus::Rejected, at, actor)
    }

    fn record_review(&mut self, admin_id: u64, note: &str, at: DateTime<Utc>) {
        let note = note.trim();
        self.reviewed_by = Some(admin_id);
        self.reviewed_at = Some(at);
        self.review_note = (!note.is_empty()).then(|| note.to_string());
    }
}

pub fn admin_actor(admin_id: u64) -> String {
    format!("admin:{admin_id}")
}

pub fn gateway_actor(gateway_code: &str) -> String {
    format!("gateway:{gateway_code}")
}

/// A page of top-ups plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct TopupPage {
    pub items: Vec<Topup>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::quote::fixtures as quote_fixtures;

    pub fn topup(topup_id: &str, user_id: u64, action: RiskAction, at: DateTime<Utc>) -> Topup {
        let mut quote = quote_fixtures::quote(&format!("q-{topup_id}"), user_id, at);
        quote.risk.action = action;
        Topup::from_quote(
            &quote,
            TopupDraft {
                topup_id: topup_id.to_string(),
                channel: Channel::Web,
                device_fingerprint: None,
                created_at: at,
            },
        )
    }
}
