use super::config::TopupConfig;
use super::money::Lkm;
use super::quote::Quote;
use super::risk::UserHistory;
use super::topup::{Topup, TopupDraft, TopupPage, TopupStatus};
use super::webhook::{EventKey, NormalizedEvent, WebhookEventRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<Option<TopupConfig>>;
    async fn save(&self, config: &TopupConfig) -> Result<()>;
}

/// Everything needed to turn a quote into a top-up in one atomic step.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub quote_id: String,
    pub user_id: u64,
    pub now: DateTime<Utc>,
    pub draft: TopupDraft,
}

/// A top-up write guarded by the status it was read with.
#[derive(Debug, Clone)]
pub struct TopupUpdate {
    pub topup: Topup,
    pub expected_status: TopupStatus,
}

/// One atomic write: an optional guarded top-up update plus an optional event record.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub update: Option<TopupUpdate>,
    pub event: Option<WebhookEventRecord>,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(Option<Topup>),
    /// The event was recorded by someone else first; nothing was written.
    DuplicateEvent(WebhookEventRecord),
}

/// Durable storage for quotes, top-ups and webhook events.
///
/// Quotes and top-ups live behind one port because redemption has to consume
/// the quote and create the order atomically. Implementations must make
/// [`TopupRepository::redeem_quote`] and [`TopupRepository::commit`] all-or-nothing.
#[async_trait]
pub trait TopupRepository: Send + Sync {
    async fn insert_quote(&self, quote: Quote) -> Result<()>;
    async fn get_quote(&self, quote_id: &str) -> Result<Option<Quote>>;
    /// Marks issued quotes past their expiry as expired; returns how many changed.
    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Consumes the quote if the user may still redeem it and inserts the new top-up.
    async fn redeem_quote(&self, redemption: Redemption) -> Result<Topup>;

    async fn get_topup(&self, topup_id: &str) -> Result<Option<Topup>>;
    /// The user's own top-ups, newest first. `page` starts at 1.
    async fn list_user_topups(
        &self,
        user_id: u64,
        status: Option<TopupStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TopupPage>;
    /// All top-ups, newest first.
    async fn list_topups(&self, status: Option<TopupStatus>, limit: u32) -> Result<Vec<Topup>>;
    async fn user_history(&self, user_id: u64, since: DateTime<Utc>) -> Result<UserHistory>;

    async fn find_event(&self, key: &EventKey) -> Result<Option<WebhookEventRecord>>;
    async fn commit(&self, commit: Commit) -> Result<CommitOutcome>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub user_id: u64,
    pub amount: Lkm,
    pub memo: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// The wallet. Credits with an already-seen idempotency key return the original transaction.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn credit(
        &self,
        user_id: u64,
        amount: Lkm,
        memo: &str,
        idempotency_key: &str,
    ) -> Result<LedgerTransaction>;
    async fn balance(&self, user_id: u64) -> Result<u64>;
}

/// What the client needs to start paying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub client_params: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn code(&self) -> &str;
    async fn build_checkout(&self, topup: &Topup) -> Result<Checkout>;
    fn parse_webhook(&self, payload: &[u8]) -> Result<NormalizedEvent>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type TopupRepositoryRef = Arc<dyn TopupRepository>;
pub type ConfigStoreRef = Arc<dyn ConfigStore>;
pub type WalletLedgerRef = Arc<dyn WalletLedger>;
pub type GatewayAdapterRef = Arc<dyn GatewayAdapter>;
pub type ClockRef = Arc<dyn Clock>;
