#![allow(dead_code)]

use lkm_topup::application::engine::{EnginePorts, TopupEngine};
use lkm_topup::application::gateways::GatewayRegistry;
use lkm_topup::application::orders::{CreateTopupRequest, CreatedTopup};
use lkm_topup::application::pricing::PackageQuery;
use lkm_topup::application::quotes::QuoteRequest;
use lkm_topup::config::EngineSettings;
use lkm_topup::domain::channel::ChannelHints;
use lkm_topup::domain::quote::Quote;
use lkm_topup::infrastructure::clock::ManualClock;
use lkm_topup::infrastructure::gateways::{JsonWebhookAdapter, ManualAdapter};
use lkm_topup::infrastructure::in_memory::{
    InMemoryConfigStore, InMemoryTopupRepository, InMemoryWalletLedger,
};
use serde_json::Value;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub struct Harness {
    pub engine: Arc<TopupEngine>,
    pub clock: ManualClock,
    pub ledger: Arc<InMemoryWalletLedger>,
    pub repository: Arc<InMemoryTopupRepository>,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let clock = ManualClock::new(chrono::Utc::now());
    let ledger = Arc::new(InMemoryWalletLedger::new());
    let repository = Arc::new(InMemoryTopupRepository::new());
    let gateways = GatewayRegistry::new()
        .with(Arc::new(JsonWebhookAdapter::new("yookassa", "https://pay.example.com")))
        .with(Arc::new(JsonWebhookAdapter::new("stripe", "https://pay.example.com")))
        .with(Arc::new(ManualAdapter));

    let engine = TopupEngine::new(
        EnginePorts {
            repository: repository.clone(),
            config_store: Arc::new(InMemoryConfigStore::new()),
            ledger: ledger.clone(),
            gateways,
            clock: Arc::new(clock.clone()),
        },
        settings,
    );

    Harness {
        engine: Arc::new(engine),
        clock,
        ledger,
        repository,
    }
}

pub fn quote_request(lkm_amount: i64, region: &str) -> QuoteRequest {
    QuoteRequest {
        lkm_amount,
        selection: PackageQuery {
            region: region.to_string(),
            ..PackageQuery::default()
        },
        channel: ChannelHints::explicit("web"),
    }
}

pub fn redeem_request(quote_id: &str) -> CreateTopupRequest {
    CreateTopupRequest {
        quote_id: quote_id.to_string(),
        device_fingerprint: None,
        channel: ChannelHints::explicit("web"),
    }
}

pub async fn quote(harness: &Harness, user_id: u64, lkm_amount: i64) -> Quote {
    harness
        .engine
        .create_quote(user_id, &quote_request(lkm_amount, "cis"))
        .await
        .unwrap()
}

/// Issues and redeems a CIS quote for `lkm_amount`.
pub async fn topup(harness: &Harness, user_id: u64, lkm_amount: i64) -> CreatedTopup {
    let quote = quote(harness, user_id, lkm_amount).await;
    harness
        .engine
        .create_topup_from_quote(user_id, &redeem_request(&quote.quote_id))
        .await
        .unwrap()
}

pub fn webhook(event_id: &str, topup_id: &str, status: &str) -> Vec<u8> {
    format!(
        r#"{{"eventId":"{event_id}","topupId":"{topup_id}","status":"{status}","externalPaymentId":"pay_{event_id}"}}"#
    )
    .into_bytes()
}

pub fn write_script(path: &Path, commands: &[Value]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for command in commands {
        writeln!(file, "{command}")?;
    }
    Ok(())
}

pub fn outcomes(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
