use super::confirmation::ConfirmationProcessor;
use super::gateways::GatewayRegistry;
use super::orders::{CreateTopupRequest, CreatedTopup, TopupOrderManager};
use super::pricing::{PackageCatalog, PackageQuery, PricingCatalog};
use super::quotes::{QuoteIssuer, QuoteRequest};
use super::sweeper::QuoteSweeper;
use crate::config::EngineSettings;
use crate::domain::config::{ConfigUpdate, TopupConfig};
use crate::domain::ports::{ClockRef, ConfigStoreRef, TopupRepositoryRef, WalletLedgerRef};
use crate::domain::quote::Quote;
use crate::domain::topup::{Topup, TopupPage, TopupStatus};
use crate::domain::webhook::WebhookResult;
use crate::error::Result;
use std::sync::Arc;

/// The collaborators a [`TopupEngine`] is wired from.
pub struct EnginePorts {
    pub repository: TopupRepositoryRef,
    pub config_store: ConfigStoreRef,
    pub ledger: WalletLedgerRef,
    pub gateways: GatewayRegistry,
    pub clock: ClockRef,
}

/// The main entry point of the top-up engine.
///
/// `TopupEngine` is the surface a request handler talks to: one method per
/// inbound operation. It owns no state of its own beyond the services it wires
/// together; every durable change goes through the repository port.
pub struct TopupEngine {
    catalog: Arc<PricingCatalog>,
    quotes: QuoteIssuer,
    orders: TopupOrderManager,
    confirmations: Arc<ConfirmationProcessor>,
    sweeper: QuoteSweeper,
    ledger: WalletLedgerRef,
    clock: ClockRef,
}

impl TopupEngine {
    pub fn new(ports: EnginePorts, settings: EngineSettings) -> Self {
        let EnginePorts {
            repository,
            config_store,
            ledger,
            gateways,
            clock,
        } = ports;
        let gateways = Arc::new(gateways);

        let catalog = Arc::new(PricingCatalog::new(config_store));
        let confirmations = Arc::new(ConfirmationProcessor::new(
            Arc::clone(&repository),
            Arc::clone(&ledger),
            Arc::clone(&gateways),
            Arc::clone(&clock),
        ));
        let quotes = QuoteIssuer::new(
            Arc::clone(&catalog),
            Arc::clone(&repository),
            Arc::clone(&clock),
            settings.quote_ttl,
        );
        let sweeper = QuoteSweeper::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            settings.sweep_interval,
        );
        let orders = TopupOrderManager::new(
            repository,
            gateways,
            Arc::clone(&confirmations),
            Arc::clone(&clock),
            settings,
        );

        Self {
            catalog,
            quotes,
            orders,
            confirmations,
            sweeper,
            ledger,
            clock,
        }
    }

    pub async fn get_packages(&self, query: &PackageQuery) -> Result<PackageCatalog> {
        self.catalog.get_packages(query).await
    }

    pub async fn create_quote(&self, user_id: u64, request: &QuoteRequest) -> Result<Quote> {
        self.quotes.create_quote(user_id, request).await
    }

    pub async fn create_topup_from_quote(
        &self,
        user_id: u64,
        request: &CreateTopupRequest,
    ) -> Result<CreatedTopup> {
        self.orders.create_topup_from_quote(user_id, request).await
    }

    pub async fn list_user_topups(
        &self,
        user_id: u64,
        status: Option<TopupStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TopupPage> {
        self.orders.list_user_topups(user_id, status, page, limit).await
    }

    pub async fn handle_webhook(&self, gateway_code: &str, payload: &[u8]) -> Result<WebhookResult> {
        self.confirmations.handle_webhook(gateway_code, payload).await
    }

    pub async fn balance(&self, user_id: u64) -> Result<u64> {
        self.ledger.balance(user_id).await
    }

    // Admin operations.

    pub async fn get_config(&self) -> Result<TopupConfig> {
        Ok(TopupConfig::clone(&*self.catalog.config().await?))
    }

    pub async fn update_config(&self, update: ConfigUpdate, admin_id: u64) -> Result<TopupConfig> {
        self.catalog
            .update_config(update, admin_id, self.clock.now())
            .await
    }

    pub async fn preview_packages(&self, query: &PackageQuery) -> Result<PackageCatalog> {
        self.catalog.get_packages(query).await
    }

    pub async fn list_topups(&self, status: Option<TopupStatus>, limit: u32) -> Result<Vec<Topup>> {
        self.orders.list_topups(status, limit).await
    }

    pub async fn export_topups(&self) -> Result<Vec<Topup>> {
        self.orders.all_topups().await
    }

    pub async fn get_topup(&self, topup_id: &str) -> Result<Topup> {
        self.orders.get_topup(topup_id).await
    }

    pub async fn approve_manual_topup(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        self.orders.approve_manual_topup(topup_id, admin_id, note).await
    }

    pub async fn reject_topup(&self, topup_id: &str, admin_id: u64, note: &str) -> Result<Topup> {
        self.orders.reject_topup(topup_id, admin_id, note).await
    }

    pub async fn mark_paid(
        &self,
        topup_id: &str,
        admin_id: u64,
        external_payment_id: Option<&str>,
    ) -> Result<WebhookResult> {
        self.confirmations
            .mark_paid(topup_id, admin_id, external_payment_id)
            .await
    }

    /// Runs one expired-quote sweep.
    pub async fn sweep_expired_quotes(&self) -> Result<usize> {
        self.sweeper.run_once().await
    }

    /// A handle for running the periodic sweep on its own task.
    pub fn sweeper(&self) -> QuoteSweeper {
        self.sweeper.clone()
    }
}
