//! Payment confirmation: gateway webhooks, admin mark-paid, and the review
//! decisions that follow.
//!
//! This is the only module that calls [`WalletLedger::credit`]. Work on one
//! top-up is serialized through a keyed lock, and every state change is
//! written by a single guarded [`Commit`] together with its webhook event
//! record, so replays and overlapping confirmations credit at most once.
//!
//! [`WalletLedger::credit`]: crate::domain::ports::WalletLedger::credit

use super::gateways::GatewayRegistry;
use super::locks::KeyedLocks;
use crate::domain::config::normalize_gateway_code;
use crate::domain::ports::{
    ClockRef, Commit, CommitOutcome, TopupRepositoryRef, TopupUpdate, WalletLedgerRef,
};
use crate::domain::topup::{Settlement, Topup, TopupStatus, admin_actor, gateway_actor};
use crate::domain::webhook::{
    EventKey, MANUAL_GATEWAY, NormalizedEvent, PaymentOutcome, WebhookEventRecord, WebhookResult,
};
use crate::error::{Result, TopupError};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ConfirmationProcessor {
    repository: TopupRepositoryRef,
    ledger: WalletLedgerRef,
    gateways: Arc<GatewayRegistry>,
    clock: ClockRef,
    locks: KeyedLocks,
}

impl ConfirmationProcessor {
    pub fn new(
        repository: TopupRepositoryRef,
        ledger: WalletLedgerRef,
        gateways: Arc<GatewayRegistry>,
        clock: ClockRef,
    ) -> Self {
        Self {
            repository,
            ledger,
            gateways,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Handles one inbound gateway notification.
    ///
    /// Returns the same `{topup_id, status}` for the first delivery and for
    /// every replay of the same event id.
    pub async fn handle_webhook(&self, gateway_code: &str, payload: &[u8]) -> Result<WebhookResult> {
        let gateway = normalize_gateway_code(gateway_code);
        let adapter = self.gateways.get(&gateway).ok_or_else(|| {
            warn!(gateway = %gateway, "Webhook for unknown gateway");
            TopupError::GatewayDisabled(gateway.clone())
        })?;

        let event = adapter.parse_webhook(payload).inspect_err(|e| {
            warn!(gateway = %gateway, error = %e, payload = %String::from_utf8_lossy(payload), "Rejected webhook payload");
        })?;
        self.process(&gateway, event).await
    }

    /// Confirms a payment on an administrator's word.
    ///
    /// Goes through the `manual` gateway exactly like a webhook, under a fresh event id.
    pub async fn mark_paid(
        &self,
        topup_id: &str,
        admin_id: u64,
        external_payment_id: Option<&str>,
    ) -> Result<WebhookResult> {
        let payload = json!({
            "topupId": topup_id,
            "status": "paid",
            "externalPaymentId": external_payment_id,
            "adminId": admin_id,
        });
        let body = serde_json::to_vec(&payload)?;
        info!(topup_id, admin_id, "Admin marked top-up as paid");
        self.handle_webhook(MANUAL_GATEWAY, &body).await
    }

    async fn process(&self, gateway: &str, event: NormalizedEvent) -> Result<WebhookResult> {
        let key = EventKey::new(gateway, &event.event_id);
        if let Some(recorded) = self.repository.find_event(&key).await? {
            return Ok(replayed(recorded));
        }

        let _guard = self.locks.lock(&event.topup_id).await;
        if let Some(recorded) = self.repository.find_event(&key).await? {
            return Ok(replayed(recorded));
        }

        let Some(current) = self.repository.get_topup(&event.topup_id).await? else {
            warn!(gateway, event_id = %event.event_id, topup_id = %event.topup_id, "Webhook for unknown top-up");
            return Err(TopupError::TopupNotFound);
        };

        let received_at = self.clock.now();
        let actor = gateway_actor(gateway);
        let mut next = current.clone();
        if !current.status.is_terminal() {
            match event.outcome {
                PaymentOutcome::Succeeded => {
                    let settlement = next.confirm_payment(
                        event.external_payment_id.clone(),
                        received_at,
                        &actor,
                    )?;
                    if settlement == Settlement::CreditNow {
                        self.credit(&mut next, received_at, &actor).await?;
                    }
                }
                PaymentOutcome::Failed => {
                    next.fail_payment(event.external_payment_id.clone(), received_at, &actor)?;
                }
                PaymentOutcome::Informational => {}
            }
        }

        let record = WebhookEventRecord {
            gateway_code: gateway.to_string(),
            event_id: event.event_id,
            topup_id: current.topup_id.clone(),
            raw_status: event.raw_status,
            outcome: event.outcome,
            resulting_status: next.status,
            payload_json: event.payload_json,
            received_at,
            processed_at: self.clock.now(),
        };
        let update = (next != current).then(|| TopupUpdate {
            topup: next,
            expected_status: current.status,
        });

        match self.commit(update, Some(record.clone())).await? {
            CommitOutcome::DuplicateEvent(recorded) => Ok(replayed(recorded)),
            CommitOutcome::Committed(_) => {
                info!(
                    gateway,
                    event_id = %record.event_id,
                    topup_id = %record.topup_id,
                    from = %current.status,
                    to = %record.resulting_status,
                    "Processed payment event"
                );
                Ok(WebhookResult {
                    topup_id: record.topup_id,
                    status: record.resulting_status,
                    replayed: false,
                })
            }
        }
    }

    /// Approves a top-up held for review and credits it.
    pub async fn approve(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        let _guard = self.locks.lock(topup_id).await;
        let current = self.load(topup_id).await?;
        let now = self.clock.now();
        let actor = admin_actor(admin_id);

        let mut next = current.clone();
        next.approve(admin_id, note, now)?;
        self.credit(&mut next, now, &actor).await?;
        let topup = self.write(next, current.status).await?;
        info!(topup_id, admin_id, "Manual top-up approved");
        Ok(topup)
    }

    pub async fn reject(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        let _guard = self.locks.lock(topup_id).await;
        let current = self.load(topup_id).await?;
        let mut next = current.clone();
        next.reject_review(admin_id, note, self.clock.now())?;
        let topup = self.write(next, current.status).await?;
        info!(topup_id, admin_id, "Manual top-up rejected");
        Ok(topup)
    }

    async fn load(&self, topup_id: &str) -> Result<Topup> {
        self.repository
            .get_topup(topup_id)
            .await?
            .ok_or(TopupError::TopupNotFound)
    }

    async fn credit(&self, topup: &mut Topup, at: DateTime<Utc>, actor: &str) -> Result<()> {
        let memo = format!("LKM top-up {}", topup.topup_id);
        let transaction = self
            .ledger
            .credit(topup.user_id, topup.receive_lkm, &memo, &topup.ledger_key())
            .await
            .inspect_err(|e| {
                error!(topup_id = %topup.topup_id, user_id = topup.user_id, error = %e, "Wallet credit failed");
            })?;
        topup.mark_credited(transaction.transaction_id, at, actor)?;
        info!(
            topup_id = %topup.topup_id,
            user_id = topup.user_id,
            amount = topup.receive_lkm.value(),
            "Wallet credited"
        );
        Ok(())
    }

    async fn write(&self, topup: Topup, expected_status: TopupStatus) -> Result<Topup> {
        let update = TopupUpdate {
            topup,
            expected_status,
        };
        let fallback = update.topup.clone();
        match self.commit(Some(update), None).await? {
            CommitOutcome::Committed(written) => Ok(written.unwrap_or(fallback)),
            CommitOutcome::DuplicateEvent(_) => Ok(fallback),
        }
    }

    async fn commit(
        &self,
        update: Option<TopupUpdate>,
        event: Option<WebhookEventRecord>,
    ) -> Result<CommitOutcome> {
        let topup_id = update.as_ref().map(|u| u.topup.topup_id.clone());
        self.repository
            .commit(Commit { update, event })
            .await
            .inspect_err(|e| {
                error!(topup_id = ?topup_id, error = %e, "Failed to commit top-up change");
            })
    }
}

fn replayed(record: WebhookEventRecord) -> WebhookResult {
    info!(
        gateway = %record.gateway_code,
        event_id = %record.event_id,
        topup_id = %record.topup_id,
        "Replayed webhook event"
    );
    WebhookResult {
        topup_id: record.topup_id,
        status: record.resulting_status,
        replayed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::Channel;
    use crate::domain::ports::{Redemption, TopupRepository, WalletLedger};
    use crate::domain::quote::fixtures::quote;
    use crate::domain::risk::RiskAction;
    use crate::domain::topup::TopupDraft;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::gateways::{JsonWebhookAdapter, ManualAdapter};
    use crate::infrastructure::in_memory::{InMemoryTopupRepository, InMemoryWalletLedger};

    struct Harness {
        repo: Arc<InMemoryTopupRepository>,
        ledger: Arc<InMemoryWalletLedger>,
        processor: ConfirmationProcessor,
    }

    async fn harness(action: RiskAction) -> Harness {
        let now = Utc::now();
        let repo = Arc::new(InMemoryTopupRepository::new());
        let ledger = Arc::new(InMemoryWalletLedger::new());
        let mut q = quote("q1", 1, now);
        q.risk.action = action;
        repo.insert_quote(q).await.unwrap();
        repo.redeem_quote(Redemption {
            quote_id: "q1".into(),
            user_id: 1,
            now,
            draft: TopupDraft {
                topup_id: "t1".into(),
                channel: Channel::Web,
                device_fingerprint: None,
                created_at: now,
            },
        })
        .await
        .unwrap();

        let gateways = GatewayRegistry::new()
            .with(Arc::new(JsonWebhookAdapter::new("yookassa", "https://pay.example.com")))
            .with(Arc::new(ManualAdapter));
        let processor = ConfirmationProcessor::new(
            repo.clone(),
            ledger.clone(),
            Arc::new(gateways),
            Arc::new(ManualClock::new(now)),
        );
        Harness {
            repo,
            ledger,
            processor,
        }
    }

    fn body(event_id: &str, status: &str) -> Vec<u8> {
        json!({"eventId": event_id, "topupId": "t1", "status": status}).to_string().into_bytes()
    }

    #[tokio::test]
    async fn test_success_credits_once_across_replays() {
        let h = harness(RiskAction::Auto).await;
        for attempt in 0..3 {
            let result = h.processor.handle_webhook("yookassa", &body("evt_1", "succeeded")).await.unwrap();
            assert_eq!(result.status, TopupStatus::Credited);
            assert_eq!(result.replayed, attempt > 0);
        }
        assert_eq!(h.ledger.balance(1).await.unwrap(), 500);
        assert_eq!(h.ledger.credit_calls().await, 1);
    }

    #[tokio::test]
    async fn test_manual_risk_waits_for_approval() {
        let h = harness(RiskAction::Manual).await;
        let first = h.processor.handle_webhook("yookassa", &body("evt_1", "paid")).await.unwrap();
        assert_eq!(first.status, TopupStatus::AwaitingManualReview);
        let second = h.processor.handle_webhook("yookassa", &body("evt_2", "paid")).await.unwrap();
        assert_eq!(second.status, TopupStatus::AwaitingManualReview);
        assert_eq!(h.ledger.credit_calls().await, 0);

        let approved = h.processor.approve("t1", 42, "checked").await.unwrap();
        assert_eq!(approved.status, TopupStatus::Credited);
        assert_eq!(approved.reviewed_by, Some(42));
        assert_eq!(h.ledger.balance(1).await.unwrap(), 500);

        let again = h.processor.approve("t1", 42, "checked").await;
        assert!(matches!(again, Err(TopupError::TopupNotAwaitingReview(TopupStatus::Credited))));
    }

    #[tokio::test]
    async fn test_failure_rejects_and_late_success_is_ignored() {
        let h = harness(RiskAction::Auto).await;
        let failed = h.processor.handle_webhook("yookassa", &body("evt_1", "canceled")).await.unwrap();
        assert_eq!(failed.status, TopupStatus::Rejected);

        let late = h.processor.handle_webhook("yookassa", &body("evt_2", "succeeded")).await.unwrap();
        assert_eq!(late.status, TopupStatus::Rejected);
        assert!(!late.replayed);
        assert_eq!(h.ledger.credit_calls().await, 0);
        let event = h.repo.find_event(&EventKey::new("yookassa", "evt_2")).await.unwrap();
        assert!(event.is_some());
    }

    #[tokio::test]
    async fn test_informational_event_leaves_order_pending() {
        let h = harness(RiskAction::Auto).await;
        let result = h.processor.handle_webhook("yookassa", &body("evt_1", "waiting_for_capture")).await.unwrap();
        assert_eq!(result.status, TopupStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_unknown_topup_records_nothing() {
        let h = harness(RiskAction::Auto).await;
        let payload = json!({"eventId": "evt_9", "topupId": "missing", "status": "paid"}).to_string();
        let result = h.processor.handle_webhook("yookassa", payload.as_bytes()).await;
        assert!(matches!(result, Err(TopupError::TopupNotFound)));
        assert!(h.repo.find_event(&EventKey::new("yookassa", "evt_9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_paid_uses_manual_gateway() {
        let h = harness(RiskAction::Auto).await;
        let result = h.processor.mark_paid("t1", 7, Some("bank-ref-1")).await.unwrap();
        assert_eq!(result.status, TopupStatus::Credited);

        let topup = h.repo.get_topup("t1").await.unwrap().unwrap();
        assert_eq!(topup.external_payment_id.as_deref(), Some("bank-ref-1"));
        assert!(topup.history.iter().all(|c| c.actor == "gateway:manual"));
    }

    #[tokio::test]
    async fn test_reject_requires_review_state() {
        let h = harness(RiskAction::Auto).await;
        let result = h.processor.reject("t1", 1, "no").await;
        assert!(matches!(
            result,
            Err(TopupError::TopupNotAwaitingReview(TopupStatus::PendingPayment))
        ));
        assert!(matches!(h.processor.reject("nope", 1, "no").await, Err(TopupError::TopupNotFound)));
    }
}
