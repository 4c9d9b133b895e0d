use crate::domain::config::TopupConfig;
use crate::domain::money::Lkm;
use crate::domain::ports::{
    Commit, CommitOutcome, ConfigStore, LedgerTransaction, Redemption, TopupRepository,
    WalletLedger,
};
use crate::domain::quote::{Quote, QuoteStatus};
use crate::domain::risk::UserHistory;
use crate::domain::topup::{Topup, TopupPage, TopupStatus};
use crate::domain::webhook::{EventKey, WebhookEventRecord};
use crate::error::{Result, TopupError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct RepositoryState {
    quotes: HashMap<String, Quote>,
    topups: HashMap<String, Topup>,
    events: HashMap<EventKey, WebhookEventRecord>,
}

/// A thread-safe in-memory repository for quotes, top-ups and webhook events.
///
/// One `RwLock` guards all three tables, so every multi-row write (redemption,
/// guarded commits) happens under a single write guard.
#[derive(Default, Clone)]
pub struct InMemoryTopupRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryTopupRepository {
    /// Creates a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; the id breaks ties so paging is stable.
pub(crate) fn sort_newest_first(topups: &mut [Topup]) {
    topups.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.topup_id.cmp(&a.topup_id))
    });
}

pub(crate) fn paginate(mut items: Vec<Topup>, page: u32, limit: u32) -> TopupPage {
    sort_newest_first(&mut items);
    let total = items.len() as u64;
    let page = page.max(1);
    let offset = (page as usize - 1).saturating_mul(limit as usize);
    let items = items.into_iter().skip(offset).take(limit as usize).collect();
    TopupPage {
        items,
        total,
        page,
        limit,
    }
}

pub(crate) fn summarize_history<'a>(
    topups: impl Iterator<Item = &'a Topup>,
    since: DateTime<Utc>,
) -> UserHistory {
    let mut history = UserHistory::default();
    for topup in topups {
        history.total_count += 1;
        if topup.created_at >= since {
            history.recent_count += 1;
        }
        let flagged = matches!(
            topup.status,
            TopupStatus::AwaitingManualReview | TopupStatus::Rejected
        ) || topup
            .history
            .iter()
            .any(|change| change.to == TopupStatus::AwaitingManualReview);
        if flagged {
            history.flagged_count += 1;
        }
    }
    history
}

#[async_trait]
impl TopupRepository for InMemoryTopupRepository {
    async fn insert_quote(&self, quote: Quote) -> Result<()> {
        let mut state = self.state.write().await;
        state.quotes.insert(quote.quote_id.clone(), quote);
        Ok(())
    }

    async fn get_quote(&self, quote_id: &str) -> Result<Option<Quote>> {
        let state = self.state.read().await;
        Ok(state.quotes.get(quote_id).cloned())
    }

    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut expired = 0;
        for quote in state.quotes.values_mut() {
            if quote.status == QuoteStatus::Issued && now > quote.expires_at {
                quote.status = QuoteStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn redeem_quote(&self, redemption: Redemption) -> Result<Topup> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let quote = state
            .quotes
            .get_mut(&redemption.quote_id)
            .ok_or(TopupError::QuoteNotFound)?;
        quote.check_redeemable(redemption.user_id, redemption.now)?;
        quote.consume(redemption.now);

        let topup = Topup::from_quote(quote, redemption.draft);
        state.topups.insert(topup.topup_id.clone(), topup.clone());
        Ok(topup)
    }

    async fn get_topup(&self, topup_id: &str) -> Result<Option<Topup>> {
        let state = self.state.read().await;
        Ok(state.topups.get(topup_id).cloned())
    }

    async fn list_user_topups(
        &self,
        user_id: u64,
        status: Option<TopupStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TopupPage> {
        let state = self.state.read().await;
        let items = state
            .topups
            .values()
            .filter(|t| t.user_id == user_id && status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        Ok(paginate(items, page, limit))
    }

    async fn list_topups(&self, status: Option<TopupStatus>, limit: u32) -> Result<Vec<Topup>> {
        let state = self.state.read().await;
        let mut items: Vec<Topup> = state
            .topups
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        sort_newest_first(&mut items);
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn user_history(&self, user_id: u64, since: DateTime<Utc>) -> Result<UserHistory> {
        let state = self.state.read().await;
        Ok(summarize_history(
            state.topups.values().filter(|t| t.user_id == user_id),
            since,
        ))
    }

    async fn find_event(&self, key: &EventKey) -> Result<Option<WebhookEventRecord>> {
        let state = self.state.read().await;
        Ok(state.events.get(key).cloned())
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;

        if let Some(event) = &commit.event
            && let Some(existing) = state.events.get(&event.key())
        {
            return Ok(CommitOutcome::DuplicateEvent(existing.clone()));
        }
        if let Some(update) = &commit.update {
            let current = state
                .topups
                .get(&update.topup.topup_id)
                .ok_or(TopupError::TopupNotFound)?;
            if current.status != update.expected_status {
                return Err(TopupError::ConcurrentUpdate(update.topup.topup_id.clone()));
            }
        }

        let written = commit.update.map(|update| {
            state
                .topups
                .insert(update.topup.topup_id.clone(), update.topup.clone());
            update.topup
        });
        if let Some(event) = commit.event {
            state.events.insert(event.key(), event);
        }
        Ok(CommitOutcome::Committed(written))
    }
}

/// Business configuration held in memory; the binary seeds it from a JSON file.
#[derive(Default, Clone)]
pub struct InMemoryConfigStore {
    config: Arc<RwLock<Option<TopupConfig>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TopupConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(Some(config))),
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self) -> Result<Option<TopupConfig>> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &TopupConfig) -> Result<()> {
        *self.config.write().await = Some(config.clone());
        Ok(())
    }
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<u64, u64>,
    by_key: HashMap<String, LedgerTransaction>,
    credit_calls: usize,
}

/// An in-memory wallet that honours idempotency keys.
#[derive(Default, Clone)]
pub struct InMemoryWalletLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryWalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `credit` calls received, including de-duplicated ones.
    pub async fn credit_calls(&self) -> usize {
        self.state.read().await.credit_calls
    }

    /// Number of distinct transactions actually booked.
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.by_key.len()
    }

}

#[async_trait]
impl WalletLedger for InMemoryWalletLedger {
    async fn credit(
        &self,
        user_id: u64,
        amount: Lkm,
        memo: &str,
        idempotency_key: &str,
    ) -> Result<LedgerTransaction> {
        let mut state = self.state.write().await;
        state.credit_calls += 1;
        if let Some(existing) = state.by_key.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let current = state.balances.get(&user_id).copied().unwrap_or(0);
        let balance = current
            .checked_add(amount.value())
            .ok_or_else(|| TopupError::Ledger(format!("balance overflow for user {user_id}")))?;
        let transaction = LedgerTransaction {
            transaction_id: Uuid::new_v4().to_string(),
            user_id,
            amount,
            memo: memo.to_string(),
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
        };
        state.balances.insert(user_id, balance);
        state
            .by_key
            .insert(idempotency_key.to_string(), transaction.clone());
        Ok(transaction)
    }

    async fn balance(&self, user_id: u64) -> Result<u64> {
        Ok(self
            .state
            .read()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }
}
