use super::in_memory::{paginate, sort_newest_first, summarize_history};
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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family holding the single business configuration document.
pub const CF_CONFIG: &str = "config";
pub const CF_QUOTES: &str = "quotes";
pub const CF_TOPUPS: &str = "topups";
/// Webhook event records keyed by `gateway\0event`.
pub const CF_EVENTS: &str = "webhook_events";
pub const CF_BALANCES: &str = "wallet_balances";
/// Ledger transactions keyed by idempotency key.
pub const CF_LEDGER: &str = "wallet_transactions";

const CONFIG_KEY: &[u8] = b"topup_config";

/// A persistent store using RocksDB for configuration, orders and the wallet.
///
/// Every read-check-write sequence (redemption, guarded commits, ledger
/// credits) runs under one process-wide mutex and lands as a single
/// `WriteBatch`, so a crash never leaves half of a change on disk.
///
/// `Clone` shares the underlying database and lock.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_CONFIG, CF_QUOTES, CF_TOPUPS, CF_EVENTS, CF_BALANCES, CF_LEDGER]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            TopupError::Io(std::io::Error::other(format!(
                "{name} column family not found"
            )))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        family: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(family)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, family: &str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl ConfigStore for RocksDBStore {
    async fn load(&self) -> Result<Option<TopupConfig>> {
        self.get_json(CF_CONFIG, CONFIG_KEY)
    }

    async fn save(&self, config: &TopupConfig) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_CONFIG, CONFIG_KEY, config)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl TopupRepository for RocksDBStore {
    async fn insert_quote(&self, quote: Quote) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_QUOTES, quote.quote_id.as_bytes(), &quote)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_quote(&self, quote_id: &str) -> Result<Option<Quote>> {
        self.get_json(CF_QUOTES, quote_id.as_bytes())
    }

    async fn expire_quotes(&self, now: DateTime<Utc>) -> Result<usize> {
        let _lock = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        let mut expired = 0;
        for mut quote in self.scan::<Quote>(CF_QUOTES)? {
            if quote.status == QuoteStatus::Issued && now > quote.expires_at {
                quote.status = QuoteStatus::Expired;
                self.put_json(&mut batch, CF_QUOTES, quote.quote_id.as_bytes(), &quote)?;
                expired += 1;
            }
        }
        if expired > 0 {
            self.db.write(batch)?;
        }
        Ok(expired)
    }

    async fn redeem_quote(&self, redemption: Redemption) -> Result<Topup> {
        let _lock = self.write_lock.lock().await;
        let mut quote: Quote = self
            .get_json(CF_QUOTES, redemption.quote_id.as_bytes())?
            .ok_or(TopupError::QuoteNotFound)?;
        quote.check_redeemable(redemption.user_id, redemption.now)?;
        quote.consume(redemption.now);
        let topup = Topup::from_quote(&quote, redemption.draft);

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_QUOTES, quote.quote_id.as_bytes(), &quote)?;
        self.put_json(&mut batch, CF_TOPUPS, topup.topup_id.as_bytes(), &topup)?;
        self.db.write(batch)?;
        Ok(topup)
    }

    async fn get_topup(&self, topup_id: &str) -> Result<Option<Topup>> {
        self.get_json(CF_TOPUPS, topup_id.as_bytes())
    }

    async fn list_user_topups(
        &self,
        user_id: u64,
        status: Option<TopupStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TopupPage> {
        let items = self
            .scan::<Topup>(CF_TOPUPS)?
            .into_iter()
            .filter(|t| t.user_id == user_id && status.is_none_or(|s| t.status == s))
            .collect();
        Ok(paginate(items, page, limit))
    }

    async fn list_topups(&self, status: Option<TopupStatus>, limit: u32) -> Result<Vec<Topup>> {
        let mut items: Vec<Topup> = self
            .scan::<Topup>(CF_TOPUPS)?
            .into_iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .collect();
        sort_newest_first(&mut items);
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn user_history(&self, user_id: u64, since: DateTime<Utc>) -> Result<UserHistory> {
        let topups = self.scan::<Topup>(CF_TOPUPS)?;
        Ok(summarize_history(
            topups.iter().filter(|t| t.user_id == user_id),
            since,
        ))
    }

    async fn find_event(&self, key: &EventKey) -> Result<Option<WebhookEventRecord>> {
        self.get_json(CF_EVENTS, key.encode().as_bytes())
    }

    async fn commit(&self, commit: Commit) -> Result<CommitOutcome> {
        let _lock = self.write_lock.lock().await;

        if let Some(event) = &commit.event
            && let Some(existing) = self.find_event(&event.key()).await?
        {
            return Ok(CommitOutcome::DuplicateEvent(existing));
        }
        if let Some(update) = &commit.update {
            let current: Topup = self
                .get_json(CF_TOPUPS, update.topup.topup_id.as_bytes())?
                .ok_or(TopupError::TopupNotFound)?;
            if current.status != update.expected_status {
                return Err(TopupError::ConcurrentUpdate(update.topup.topup_id.clone()));
            }
        }

        let mut batch = WriteBatch::default();
        if let Some(update) = &commit.update {
            self.put_json(
                &mut batch,
                CF_TOPUPS,
                update.topup.topup_id.as_bytes(),
                &update.topup,
            )?;
        }
        if let Some(event) = &commit.event {
            self.put_json(&mut batch, CF_EVENTS, event.key().encode().as_bytes(), event)?;
        }
        self.db.write(batch)?;

        Ok(CommitOutcome::Committed(commit.update.map(|u| u.topup)))
    }
}

#[async_trait]
impl WalletLedger for RocksDBStore {
    async fn credit(
        &self,
        user_id: u64,
        amount: Lkm,
        memo: &str,
        idempotency_key: &str,
    ) -> Result<LedgerTransaction> {
        let _lock = self.write_lock.lock().await;
        if let Some(existing) = self.get_json(CF_LEDGER, idempotency_key.as_bytes())? {
            return Ok(existing);
        }

        let key = user_id.to_be_bytes();
        let current: u64 = self.get_json(CF_BALANCES, &key)?.unwrap_or(0);
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

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_BALANCES, &key, &balance)?;
        self.put_json(&mut batch, CF_LEDGER, idempotency_key.as_bytes(), &transaction)?;
        self.db.write(batch)?;
        Ok(transaction)
    }

    async fn balance(&self, user_id: u64) -> Result<u64> {
        Ok(self
            .get_json(CF_BALANCES, &user_id.to_be_bytes())?
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::Channel;
    use crate::domain::quote::fixtures::quote;
    use crate::domain::topup::TopupDraft;
    use tempfile::tempdir;

    fn redemption(quote_id: &str, topup_id: &str, now: DateTime<Utc>) -> Redemption {
        Redemption {
            quote_id: quote_id.into(),
            user_id: 1,
            now,
            draft: TopupDraft {
                topup_id: topup_id.into(),
                channel: Channel::Web,
                device_fingerprint: None,
                created_at: now,
            },
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_CONFIG, CF_QUOTES, CF_TOPUPS, CF_EVENTS, CF_BALANCES, CF_LEDGER] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_redeem_is_single_use() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let now = Utc::now();
        store.insert_quote(quote("q1", 1, now)).await.unwrap();

        let topup = store.redeem_quote(redemption("q1", "t1", now)).await.unwrap();
        assert_eq!(store.get_topup("t1").await.unwrap(), Some(topup));
        assert!(matches!(
            store.redeem_quote(redemption("q1", "t2", now)).await,
            Err(TopupError::QuoteAlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_wallet_survives_reopen() {
        let dir = tempdir().unwrap();
        let amount = Lkm::new(500).unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store.credit(1, amount, "LKM top-up t1", "lkm_topup:t1").await.unwrap();
            store.credit(1, amount, "LKM top-up t1", "lkm_topup:t1").await.unwrap();
            store.save(&TopupConfig::default()).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.balance(1).await.unwrap(), 500);
        assert_eq!(store.load().await.unwrap(), Some(TopupConfig::default()));
    }
}
