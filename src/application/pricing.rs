//! Pricing catalog: turns an LKM amount plus region, currency and gateway
//! selection into a fully resolved [`PriceBreakdown`].
//!
//! The business configuration is read-mostly, so the catalog keeps a cached
//! copy and drops it whenever an administrator saves an update.

use crate::domain::config::{
    ConfigUpdate, Gateway, Region, RegionConfig, TopupConfig, normalize_currency,
    normalize_gateway_code, normalize_payment_method,
};
use crate::domain::money::{Lkm, Money, REFERENCE_MINOR_UNITS};
use crate::domain::ports::ConfigStoreRef;
use crate::domain::quote::PriceBreakdown;
use crate::error::{Result, TopupError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const PROCESSING_DISCLAIMER: &str =
    "Processing costs of the selected payment method are already included in the total";

/// Client selection for pricing. Every field is optional; blanks fall back to regional defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageQuery {
    pub region: String,
    pub currency: String,
    pub gateway_code: String,
    pub payment_method: String,
    /// Host the request arrived on; decides the region when none is given.
    pub host: String,
}

/// A resolved pricing selection: which region, currency, gateway and rate apply.
#[derive(Debug, Clone)]
struct Selection {
    region: RegionConfig,
    currency: String,
    gateway_code: String,
    payment_method: String,
    rub_per_unit: rust_decimal::Decimal,
    minor_units: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageOffer {
    pub lkm_amount: u64,
    #[serde(flatten)]
    pub pricing: PriceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageCatalog {
    pub region: Region,
    pub currency: String,
    pub gateway_code: String,
    pub payment_method: String,
    pub packages: Vec<PackageOffer>,
    pub custom_min_lkm: u64,
    pub custom_max_lkm: u64,
    pub custom_step_lkm: u64,
    pub disclaimer: String,
}

pub struct PricingCatalog {
    store: ConfigStoreRef,
    cache: RwLock<Option<Arc<TopupConfig>>>,
}

impl PricingCatalog {
    pub fn new(store: ConfigStoreRef) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// The current configuration, loading it on first use.
    ///
    /// An empty store yields the seeded defaults.
    pub async fn config(&self) -> Result<Arc<TopupConfig>> {
        if let Some(config) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(config));
        }

        let mut cache = self.cache.write().await;
        if let Some(config) = cache.as_ref() {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new(self.store.load().await?.unwrap_or_default());
        *cache = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Merges an admin update, persists it and invalidates the cache.
    pub async fn update_config(
        &self,
        update: ConfigUpdate,
        admin_id: u64,
        now: DateTime<Utc>,
    ) -> Result<TopupConfig> {
        let mut cache = self.cache.write().await;
        let mut config = match cache.as_ref() {
            Some(current) => TopupConfig::clone(current),
            None => self.store.load().await?.unwrap_or_default(),
        };
        config.merge(update, admin_id, now);
        self.store.save(&config).await?;
        *cache = None;

        info!(admin_id, "Top-up configuration updated");
        Ok(config)
    }

    /// Priced offers for every active package in the resolved region.
    pub async fn get_packages(&self, query: &PackageQuery) -> Result<PackageCatalog> {
        let config = self.config().await?;
        let selection = select(&config, query)?;

        let packages = config
            .active_packages(selection.region.region)
            .into_iter()
            .filter_map(|package| {
                let amount = i64::try_from(package.lkm_amount).ok()?;
                let lkm = Lkm::new(amount).ok()?;
                Some(PackageOffer {
                    lkm_amount: package.lkm_amount,
                    pricing: breakdown(&config, &selection, lkm),
                })
            })
            .collect();

        Ok(PackageCatalog {
            region: selection.region.region,
            currency: selection.currency,
            gateway_code: selection.gateway_code,
            payment_method: selection.payment_method,
            packages,
            custom_min_lkm: selection.region.custom_min_lkm,
            custom_max_lkm: selection.region.custom_max_lkm,
            custom_step_lkm: selection.region.custom_step_lkm,
            disclaimer: PROCESSING_DISCLAIMER.to_string(),
        })
    }

    /// Prices one amount, rejecting amounts that are neither a package nor a valid custom amount.
    ///
    /// Returns the configuration snapshot used, so later steps judge risk against the same data.
    pub async fn price(
        &self,
        amount: Lkm,
        query: &PackageQuery,
    ) -> Result<(Arc<TopupConfig>, PriceBreakdown)> {
        let config = self.config().await?;
        let selection = select(&config, query)?;
        if !is_valid_amount(&config, &selection.region, amount.value()) {
            return Err(TopupError::InvalidAmount);
        }

        let pricing = breakdown(&config, &selection, amount);
        debug!(
            amount = amount.value(),
            region = %pricing.region,
            gateway = %pricing.gateway_code,
            currency = %pricing.pay_currency,
            total_rub = %pricing.total_rub,
            total_pay = %pricing.total_pay_amount,
            "Priced top-up"
        );
        Ok((config, pricing))
    }
}

fn is_valid_amount(config: &TopupConfig, region: &RegionConfig, amount: u64) -> bool {
    config
        .active_packages(region.region)
        .iter()
        .any(|package| package.lkm_amount == amount)
        || region.accepts_custom(amount)
}

fn select(config: &TopupConfig, query: &PackageQuery) -> Result<Selection> {
    let region = config.region(Region::resolve(&query.region, &query.host));
    let currency = normalize_currency(&query.currency, region.region);
    let payment_method = normalize_payment_method(&query.payment_method);
    let gateway = select_gateway(
        config,
        &region,
        &normalize_gateway_code(&query.gateway_code),
        &currency,
        &payment_method,
    )?;
    let fx = config
        .fx_rate(&currency)
        .ok_or_else(|| TopupError::UnsupportedCurrency(currency.clone()))?;

    Ok(Selection {
        gateway_code: gateway.code.clone(),
        region,
        currency,
        payment_method,
        rub_per_unit: fx.rub_per_unit,
        minor_units: fx.minor_units,
    })
}

fn select_gateway<'a>(
    config: &'a TopupConfig,
    region: &RegionConfig,
    requested: &str,
    currency: &str,
    method: &str,
) -> Result<&'a Gateway> {
    let available = |g: &&Gateway| g.enabled && region.offers_gateway(&g.code);

    if !requested.is_empty() {
        let gateway = config
            .gateway(requested)
            .filter(available)
            .ok_or_else(|| TopupError::GatewayDisabled(requested.to_string()))?;
        if !gateway.supports_currency(currency) {
            return Err(TopupError::UnsupportedCurrency(currency.to_string()));
        }
        if !gateway.supports_method(method) {
            return Err(TopupError::GatewayDisabled(format!("{requested}/{method}")));
        }
        return Ok(gateway);
    }

    let fits = |g: &&Gateway| available(g) && g.supports_currency(currency) && g.supports_method(method);
    let preferred = region
        .region
        .preferred_gateways()
        .into_iter()
        .filter_map(|code| config.gateway(code))
        .find(fits);
    if let Some(gateway) = preferred.or_else(|| config.gateways.iter().find(fits)) {
        return Ok(gateway);
    }

    if config.gateways.iter().any(|g| available(&g)) {
        Err(TopupError::UnsupportedCurrency(currency.to_string()))
    } else {
        Err(TopupError::GatewayDisabled(region.region.to_string()))
    }
}

fn breakdown(config: &TopupConfig, selection: &Selection, amount: Lkm) -> PriceBreakdown {
    let region = selection.region.region;
    let nominal = Money::new(amount.as_decimal() * config.nominal_rub_per_lkm)
        .rounded(REFERENCE_MINOR_UNITS);
    let processing = config
        .processing_cost(&selection.gateway_code, &selection.payment_method, region)
        .surcharge(nominal);
    let total = nominal + processing;

    PriceBreakdown {
        gateway_code: selection.gateway_code.clone(),
        payment_method: selection.payment_method.clone(),
        region,
        pay_currency: selection.currency.clone(),
        fx_rate: selection.rub_per_unit,
        pay_minor_units: selection.minor_units,
        nominal_rub_per_lkm: config.nominal_rub_per_lkm,
        nominal_rub: nominal,
        processing_cost_rub: processing,
        total_rub: total,
        total_pay_amount: total.from_reference(selection.rub_per_unit, selection.minor_units),
    }
}
