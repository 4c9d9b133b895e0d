mod common;

use common::{harness, topup, webhook};
use lkm_topup::domain::topup::TopupStatus;
use lkm_topup::error::TopupError;
use rand::Rng;
use std::collections::HashSet;

#[tokio::test]
async fn test_user_listing_is_scoped_and_paged() {
    let h = harness();
    let mut rng = rand::thread_rng();
    let mine = rng.gen_range(5..=25);
    let theirs = rng.gen_range(1..=10);

    let mut my_ids = Vec::new();
    for _ in 0..mine {
        h.clock.advance(chrono::TimeDelta::seconds(rng.gen_range(1..60)));
        my_ids.push(topup(&h, 1, 500).await.topup.topup_id);
    }
    for _ in 0..theirs {
        topup(&h, 2, 500).await;
    }

    let limit = rng.gen_range(1..=7);
    let mut seen = Vec::new();
    let mut page = 1;
    loop {
        let result = h.engine.list_user_topups(1, None, page, limit).await.unwrap();
        assert_eq!(result.total, mine as u64);
        assert_eq!(result.limit, limit);
        if result.items.is_empty() {
            break;
        }
        assert!(result.items.len() <= limit as usize);
        assert!(result.items.iter().all(|t| t.user_id == 1));
        seen.extend(result.items);
        page += 1;
    }

    assert_eq!(seen.len(), mine);
    assert!(seen.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    let unique: HashSet<_> = seen.iter().map(|t| t.topup_id.clone()).collect();
    assert_eq!(unique.len(), mine);
    // Newest first.
    assert_eq!(seen[0].topup_id, *my_ids.last().unwrap());
}

#[tokio::test]
async fn test_user_listing_filters_by_status() {
    let h = harness();
    let paid = topup(&h, 1, 500).await.topup.topup_id;
    topup(&h, 1, 1_000).await;
    h.engine
        .handle_webhook("yookassa", &webhook("evt_1", &paid, "succeeded"))
        .await
        .unwrap();

    let credited = h
        .engine
        .list_user_topups(1, Some(TopupStatus::Credited), 1, 20)
        .await
        .unwrap();
    assert_eq!(credited.total, 1);
    assert_eq!(credited.items[0].topup_id, paid);

    let pending = h
        .engine
        .list_user_topups(1, Some(TopupStatus::PendingPayment), 1, 20)
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
}

#[tokio::test]
async fn test_listing_limits_fall_back_to_defaults() {
    let h = harness();
    for _ in 0..3 {
        topup(&h, 1, 500).await;
    }

    let oversized = h.engine.list_user_topups(1, None, 0, 1_000).await.unwrap();
    assert_eq!(oversized.page, 1);
    assert_eq!(oversized.limit, 20);
    assert_eq!(oversized.items.len(), 3);

    let admin = h.engine.list_topups(None, 10_000).await.unwrap();
    assert_eq!(admin.len(), 3);

    let anonymous = h.engine.list_user_topups(0, None, 1, 20).await;
    assert!(matches!(anonymous, Err(TopupError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_export_ignores_admin_limit() {
    let h = harness();
    for user in 1..=60 {
        topup(&h, user, 500).await;
    }

    assert_eq!(h.engine.list_topups(None, 0).await.unwrap().len(), 50);
    assert_eq!(h.engine.export_topups().await.unwrap().len(), 60);
}
