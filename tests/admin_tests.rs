mod common;

use common::{harness, quote_request, topup, webhook};
use lkm_topup::application::pricing::PackageQuery;
use lkm_topup::domain::config::{ConfigUpdate, FxRate, Region, RiskPolicy, RiskTier, TierAction};
use lkm_topup::domain::risk::RiskAction;
use lkm_topup::domain::topup::TopupStatus;
use lkm_topup::error::TopupError;
use rust_decimal_macros::dec;

fn usd_rate() -> ConfigUpdate {
    ConfigUpdate {
        fx_rates: vec![FxRate {
            currency: "usd".into(),
            rub_per_unit: dec!(92.5),
            minor_units: 2,
            active: true,
            updated_by: None,
            updated_at: None,
        }],
        ..ConfigUpdate::default()
    }
}

#[tokio::test]
async fn test_manual_tier_waits_for_approval() {
    let h = harness();
    let created = topup(&h, 1, 100_000).await;
    assert_eq!(created.topup.risk.action, RiskAction::Manual);
    let id = created.topup.topup_id;

    let result = h
        .engine
        .handle_webhook("yookassa", &webhook("evt_1", &id, "succeeded"))
        .await
        .unwrap();
    assert_eq!(result.status, TopupStatus::AwaitingManualReview);
    assert_eq!(h.engine.balance(1).await.unwrap(), 0);

    let queue = h
        .engine
        .list_topups(Some(TopupStatus::AwaitingManualReview), 0)
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);

    let approved = h.engine.approve_manual_topup(&id, 42, "documents ok").await.unwrap();
    assert_eq!(approved.status, TopupStatus::Credited);
    assert_eq!(approved.reviewed_by, Some(42));
    assert_eq!(approved.review_note.as_deref(), Some("documents ok"));
    assert!(
        approved
            .history
            .iter()
            .any(|change| change.to == TopupStatus::Approved && change.actor == "admin:42")
    );
    assert_eq!(h.engine.balance(1).await.unwrap(), 100_000);

    let again = h.engine.approve_manual_topup(&id, 42, "").await;
    assert!(matches!(
        again,
        Err(TopupError::TopupNotAwaitingReview(TopupStatus::Credited))
    ));
    assert_eq!(h.ledger.credit_calls().await, 1);
}

#[tokio::test]
async fn test_rejected_review_is_never_credited() {
    let h = harness();
    let id = topup(&h, 2, 150_000).await.topup.topup_id;
    h.engine
        .handle_webhook("yookassa", &webhook("evt_1", &id, "succeeded"))
        .await
        .unwrap();

    let rejected = h.engine.reject_topup(&id, 7, "chargeback risk").await.unwrap();
    assert_eq!(rejected.status, TopupStatus::Rejected);

    let late = h.engine.approve_manual_topup(&id, 7, "").await;
    assert!(matches!(late, Err(TopupError::TopupNotAwaitingReview(_))));
    assert_eq!(h.engine.balance(2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_late_failure_keeps_paid_order_in_review() {
    let h = harness();
    let id = topup(&h, 2, 150_000).await.topup.topup_id;
    h.engine
        .handle_webhook("yookassa", &webhook("evt_1", &id, "succeeded"))
        .await
        .unwrap();

    let late = h
        .engine
        .handle_webhook("yookassa", &webhook("evt_2", &id, "canceled"))
        .await
        .unwrap();
    assert_eq!(late.status, TopupStatus::AwaitingManualReview);
    assert!(!late.replayed);

    let approved = h.engine.approve_manual_topup(&id, 7, "").await.unwrap();
    assert_eq!(approved.status, TopupStatus::Credited);
    assert_eq!(h.engine.balance(2).await.unwrap(), 150_000);
}

#[tokio::test]
async fn test_velocity_limit_counts_the_new_topup() {
    let h = harness();
    for _ in 0..4 {
        topup(&h, 8, 500).await;
    }
    let fifth = common::quote(&h, 8, 60_000).await;
    assert_eq!(fifth.risk.action, RiskAction::Auto);

    topup(&h, 8, 500).await;
    let sixth = common::quote(&h, 8, 60_000).await;
    assert_eq!(sixth.risk.action, RiskAction::Manual);
    assert_eq!(sixth.risk.reason.as_deref(), Some("velocity_limit_exceeded"));
}

#[tokio::test]
async fn test_review_actions_need_a_held_topup() {
    let h = harness();
    let id = topup(&h, 3, 500).await.topup.topup_id;

    let pending = h.engine.approve_manual_topup(&id, 1, "").await;
    assert!(matches!(
        pending,
        Err(TopupError::TopupNotAwaitingReview(TopupStatus::PendingPayment))
    ));
    let missing = h.engine.reject_topup("nope", 1, "").await;
    assert!(matches!(missing, Err(TopupError::TopupNotFound)));
}

#[tokio::test]
async fn test_mark_paid_credits_through_manual_gateway() {
    let h = harness();
    let id = topup(&h, 4, 1_000).await.topup.topup_id;

    let result = h.engine.mark_paid(&id, 9, Some("bank-transfer-17")).await.unwrap();
    assert_eq!(result.status, TopupStatus::Credited);
    assert!(!result.replayed);

    let again = h.engine.mark_paid(&id, 9, None).await.unwrap();
    assert_eq!(again.status, TopupStatus::Credited);
    assert_eq!(h.engine.balance(4).await.unwrap(), 1_000);

    let stored = h.engine.get_topup(&id).await.unwrap();
    assert_eq!(stored.external_payment_id.as_deref(), Some("bank-transfer-17"));
    assert!(stored.history.iter().any(|change| change.actor == "gateway:manual"));
}

#[tokio::test]
async fn test_fx_rate_update_enables_foreign_currency() {
    let h = harness();
    let query = PackageQuery {
        region: "non_cis".into(),
        currency: "USD".into(),
        ..PackageQuery::default()
    };
    assert!(matches!(
        h.engine.preview_packages(&query).await,
        Err(TopupError::UnsupportedCurrency(_))
    ));

    let config = h.engine.update_config(usd_rate(), 11).await.unwrap();
    let rate = config.fx_rate("USD").unwrap();
    assert_eq!(rate.updated_by, Some(11));
    assert!(rate.updated_at.is_some());

    let catalog = h.engine.get_packages(&query).await.unwrap();
    assert_eq!(catalog.region, Region::NonCis);
    assert_eq!(catalog.gateway_code, "stripe");
    let offer = catalog
        .packages
        .iter()
        .find(|offer| offer.lkm_amount == 500)
        .unwrap();
    assert_eq!(offer.pricing.total_rub.value(), dec!(514.50));
    assert_eq!(offer.pricing.total_pay_amount.value(), dec!(5.56));
    assert!(!catalog.disclaimer.is_empty());

    let mut request = quote_request(500, "non_cis");
    request.selection.currency = "USD".into();
    let quote = h.engine.create_quote(1, &request).await.unwrap();
    assert_eq!(quote.pricing.total_pay_amount, offer.pricing.total_pay_amount);
}

#[tokio::test]
async fn test_frozen_quote_ignores_later_price_changes() {
    let h = harness();
    let quote = common::quote(&h, 5, 500).await;

    h.engine
        .update_config(
            ConfigUpdate {
                nominal_rub_per_lkm: Some(dec!(2)),
                ..ConfigUpdate::default()
            },
            1,
        )
        .await
        .unwrap();

    let created = h
        .engine
        .create_topup_from_quote(5, &common::redeem_request(&quote.quote_id))
        .await
        .unwrap();
    assert_eq!(created.topup.pricing.total_rub.value(), dec!(515));
    let fresh = common::quote(&h, 5, 500).await;
    assert_eq!(fresh.pricing.total_rub.value(), dec!(1030));
}

#[tokio::test]
async fn test_block_tier_refuses_quotes() {
    let h = harness();
    h.engine
        .update_config(
            ConfigUpdate {
                risk_tiers: vec![RiskTier {
                    name: "whale".into(),
                    action: TierAction::Block,
                    min_lkm: 200_000,
                    max_lkm: 450_000,
                    region: None,
                    sort_order: -1,
                    enabled: true,
                }],
                ..ConfigUpdate::default()
            },
            1,
        )
        .await
        .unwrap();

    let blocked = h.engine.create_quote(1, &quote_request(300_000, "cis")).await;
    assert!(matches!(blocked, Err(TopupError::TopupBlocked)));
    let allowed = h.engine.create_quote(1, &quote_request(500, "cis")).await;
    assert!(allowed.is_ok());
}

#[tokio::test]
async fn test_enhanced_tier_escalates_first_large_purchase() {
    let h = harness();
    h.engine
        .update_config(
            ConfigUpdate {
                risk_policy: Some(RiskPolicy {
                    velocity_window_hours: 24,
                    velocity_limit: 5,
                    first_purchase_manual_min_lkm: Some(60_000),
                }),
                ..ConfigUpdate::default()
            },
            1,
        )
        .await
        .unwrap();

    let first = common::quote(&h, 6, 75_000).await;
    assert_eq!(first.risk.action, RiskAction::Manual);
    assert_eq!(first.risk.reason.as_deref(), Some("first_purchase_threshold"));

    topup(&h, 6, 500).await;
    let second = common::quote(&h, 6, 75_000).await;
    assert_eq!(second.risk.action, RiskAction::Auto);
    assert_eq!(second.risk.tier.as_deref(), Some("enhanced"));
}

#[tokio::test]
async fn test_get_config_reflects_updates() {
    let h = harness();
    let before = h.engine.get_config().await.unwrap();
    assert_eq!(before.nominal_rub_per_lkm, dec!(1));

    h.engine.update_config(usd_rate(), 3).await.unwrap();
    let after = h.engine.get_config().await.unwrap();
    assert_eq!(after.fx_rates.len(), before.fx_rates.len() + 1);
    assert_eq!(after.packages, before.packages);
}
