//! Admin-managed pricing and risk configuration.
//!
//! `TopupConfig` is one read-mostly document: package tiers, regions, gateways,
//! processing costs, manual FX rates and risk tiers. Admin edits arrive as a
//! [`ConfigUpdate`] and are merged by natural key.

use super::money::{Money, REFERENCE_CURRENCY, REFERENCE_MINOR_UNITS};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PAYMENT_METHOD: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Cis,
    #[serde(alias = "non-cis", alias = "noncis")]
    NonCis,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Cis => "cis",
            Region::NonCis => "non_cis",
        }
    }

    /// Parses an explicit region or country token.
    pub fn parse_token(raw: &str) -> Option<Region> {
        match raw.trim().to_lowercase().as_str() {
            "cis" | "ru" | "russia" | "by" | "kz" | "kg" | "uz" | "tj" | "am" | "az" | "md"
            | "tm" => Some(Region::Cis),
            "non_cis" | "non-cis" | "noncis" | "intl" | "international" | "global" => {
                Some(Region::NonCis)
            }
            _ => None,
        }
    }

    /// Resolves the pricing region from an explicit token, falling back to the host.
    pub fn resolve(raw: &str, host: &str) -> Region {
        if let Some(region) = Region::parse_token(raw) {
            return region;
        }
        if host.trim().to_lowercase().contains(".ru") {
            Region::Cis
        } else {
            Region::NonCis
        }
    }

    pub fn default_currency(&self) -> &'static str {
        match self {
            Region::Cis => REFERENCE_CURRENCY,
            Region::NonCis => "USD",
        }
    }

    /// Gateways tried in order when the client does not pick one.
    pub fn preferred_gateways(&self) -> [&'static str; 2] {
        match self {
            Region::Cis => ["yookassa", "stripe"],
            Region::NonCis => ["stripe", "yookassa"],
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize_gateway_code(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_payment_method(raw: &str) -> String {
    let method = raw.trim().to_lowercase();
    if method.is_empty() {
        DEFAULT_PAYMENT_METHOD.to_string()
    } else {
        method
    }
}

pub fn normalize_currency(raw: &str, region: Region) -> String {
    let currency = raw.trim().to_uppercase();
    if currency.is_empty() {
        region.default_currency().to_string()
    } else {
        currency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    /// Accepted pay currencies; empty accepts any currency with an FX rate.
    #[serde(default)]
    pub currencies: Vec<String>,
    /// Accepted payment methods; empty accepts any.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl Gateway {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.currencies.is_empty() || self.currencies.iter().any(|c| c == currency)
    }

    pub fn supports_method(&self, method: &str) -> bool {
        method == DEFAULT_PAYMENT_METHOD
            || self.methods.is_empty()
            || self.methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region: Region,
    pub custom_min_lkm: u64,
    pub custom_max_lkm: u64,
    pub custom_step_lkm: u64,
    /// Gateways offered in this region; empty offers every enabled gateway.
    #[serde(default)]
    pub gateways: Vec<String>,
}

impl RegionConfig {
    pub fn fallback(region: Region) -> Self {
        Self {
            region,
            custom_min_lkm: match region {
                Region::Cis => 199,
                Region::NonCis => 499,
            },
            custom_max_lkm: 450_000,
            custom_step_lkm: 50,
            gateways: Vec::new(),
        }
    }

    pub fn offers_gateway(&self, code: &str) -> bool {
        self.gateways.is_empty() || self.gateways.iter().any(|g| g == code)
    }

    pub fn accepts_custom(&self, amount: u64) -> bool {
        if amount < self.custom_min_lkm || amount > self.custom_max_lkm {
            return false;
        }
        self.custom_step_lkm <= 1 || amount % self.custom_step_lkm == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTier {
    pub region: Region,
    pub lkm_amount: u64,
    #[serde(default)]
    pub sort_order: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingCost {
    pub gateway_code: String,
    #[serde(default = "default_method")]
    pub payment_method: String,
    pub region: Region,
    /// Percentage of the nominal price, 0-100.
    #[serde(default)]
    pub percent: Decimal,
    #[serde(default)]
    pub fixed_rub: Decimal,
    pub enabled: bool,
}

fn default_method() -> String {
    DEFAULT_PAYMENT_METHOD.to_string()
}

impl ProcessingCost {
    /// Surcharge in the reference currency, rounded to its minor units.
    pub fn surcharge(&self, nominal: Money) -> Money {
        (nominal.percent(self.percent) + Money::new(self.fixed_rub)).rounded(REFERENCE_MINOR_UNITS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub currency: String,
    /// Units of the reference currency per one unit of `currency`.
    pub rub_per_unit: Decimal,
    #[serde(default = "default_minor_units")]
    pub minor_units: u32,
    pub active: bool,
    #[serde(default)]
    pub updated_by: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_minor_units() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierAction {
    Auto,
    /// Auto unless the user's history trips the risk policy.
    Enhanced,
    Manual,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    pub name: String,
    pub action: TierAction,
    pub min_lkm: u64,
    pub max_lkm: u64,
    /// Restricts the tier to one region; `None` applies everywhere.
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub sort_order: i32,
    pub enabled: bool,
}

impl RiskTier {
    pub fn matches(&self, amount: u64, region: Region) -> bool {
        self.enabled
            && amount >= self.min_lkm
            && amount <= self.max_lkm
            && self.region.is_none_or(|r| r == region)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub velocity_window_hours: i64,
    /// More top-ups than this inside the window sends enhanced tiers to review.
    pub velocity_limit: u64,
    /// A user's first top-up at or above this amount always goes to review.
    #[serde(default)]
    pub first_purchase_manual_min_lkm: Option<u64>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            velocity_window_hours: 24,
            velocity_limit: 5,
            first_purchase_manual_min_lkm: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopupConfig {
    pub nominal_rub_per_lkm: Decimal,
    pub gateways: Vec<Gateway>,
    pub regions: Vec<RegionConfig>,
    pub packages: Vec<PackageTier>,
    pub processing_costs: Vec<ProcessingCost>,
    pub fx_rates: Vec<FxRate>,
    pub risk_tiers: Vec<RiskTier>,
    #[serde(default)]
    pub risk_policy: RiskPolicy,
}

impl Default for TopupConfig {
    fn default() -> Self {
        let gateway = |code: &str, name: &str| Gateway {
            code: code.to_string(),
            name: name.to_string(),
            enabled: true,
            currencies: Vec::new(),
            methods: Vec::new(),
        };
        let package = |region, lkm_amount, sort_order| PackageTier {
            region,
            lkm_amount,
            sort_order,
            active: true,
        };
        let cost = |gateway_code: &str, region, percent| ProcessingCost {
            gateway_code: gateway_code.to_string(),
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            region,
            percent,
            fixed_rub: Decimal::ZERO,
            enabled: true,
        };
        let tier = |name: &str, action, min_lkm, max_lkm, sort_order| RiskTier {
            name: name.to_string(),
            action,
            min_lkm,
            max_lkm,
            region: None,
            sort_order,
            enabled: true,
        };

        let mut packages = Vec::new();
        for (i, amount) in [199, 500, 1_000, 2_500, 5_000, 10_000].into_iter().enumerate() {
            packages.push(package(Region::Cis, amount, i as i32));
        }
        for (i, amount) in [500, 1_000, 2_500, 5_000, 10_000].into_iter().enumerate() {
            packages.push(package(Region::NonCis, amount, i as i32));
        }

        Self {
            nominal_rub_per_lkm: Decimal::ONE,
            gateways: vec![gateway("stripe", "Stripe"), gateway("yookassa", "YooKassa")],
            regions: vec![
                RegionConfig::fallback(Region::Cis),
                RegionConfig::fallback(Region::NonCis),
            ],
            packages,
            processing_costs: vec![
                cost("yookassa", Region::Cis, dec!(3)),
                cost("stripe", Region::NonCis, dec!(2.9)),
            ],
            fx_rates: Vec::new(),
            risk_tiers: vec![
                tier("standard", TierAction::Auto, 1, 49_999, 0),
                tier("enhanced", TierAction::Enhanced, 50_000, 99_999, 1),
                tier("manual", TierAction::Manual, 100_000, 450_000, 2),
            ],
            risk_policy: RiskPolicy::default(),
        }
    }
}

impl TopupConfig {
    pub fn gateway(&self, code: &str) -> Option<&Gateway> {
        self.gateways.iter().find(|g| g.code == code)
    }

    pub fn region(&self, region: Region) -> RegionConfig {
        self.regions
            .iter()
            .find(|r| r.region == region)
            .cloned()
            .unwrap_or_else(|| RegionConfig::fallback(region))
    }

    /// Active packages for a region ordered by sort order, then amount.
    pub fn active_packages(&self, region: Region) -> Vec<&PackageTier> {
        let mut packages: Vec<&PackageTier> = self
            .packages
            .iter()
            .filter(|p| p.region == region && p.active)
            .collect();
        packages.sort_by_key(|p| (p.sort_order, p.lkm_amount));
        packages
    }

    /// Exact method first, then the gateway's default method, then no surcharge.
    pub fn processing_cost(&self, gateway: &str, method: &str, region: Region) -> ProcessingCost {
        let lookup = |m: &str| {
            self.processing_costs.iter().find(|c| {
                c.enabled && c.gateway_code == gateway && c.payment_method == m && c.region == region
            })
        };
        lookup(method)
            .or_else(|| lookup(DEFAULT_PAYMENT_METHOD))
            .cloned()
            .unwrap_or_else(|| ProcessingCost {
                gateway_code: gateway.to_string(),
                payment_method: method.to_string(),
                region,
                percent: Decimal::ZERO,
                fixed_rub: Decimal::ZERO,
                enabled: true,
            })
    }

    /// Rate for a pay currency. The reference currency always converts at 1.
    pub fn fx_rate(&self, currency: &str) -> Option<FxRate> {
        if currency == REFERENCE_CURRENCY {
            return Some(FxRate {
                currency: REFERENCE_CURRENCY.to_string(),
                rub_per_unit: Decimal::ONE,
                minor_units: REFERENCE_MINOR_UNITS,
                active: true,
                updated_by: None,
                updated_at: None,
            });
        }
        self.fx_rates
            .iter()
            .find(|fx| fx.active && fx.currency == currency && fx.rub_per_unit > Decimal::ZERO)
            .cloned()
    }

    /// Enabled tiers in evaluation order.
    pub fn ordered_risk_tiers(&self) -> Vec<&RiskTier> {
        let mut tiers: Vec<&RiskTier> = self.risk_tiers.iter().filter(|t| t.enabled).collect();
        tiers.sort_by_key(|t| (t.sort_order, t.min_lkm));
        tiers
    }

    /// Applies an admin update, upserting every entity by its natural key.
    pub fn merge(&mut self, update: ConfigUpdate, admin_id: u64, now: DateTime<Utc>) {
        if let Some(rate) = update.nominal_rub_per_lkm
            && rate > Decimal::ZERO
        {
            self.nominal_rub_per_lkm = rate;
        }

        for mut gateway in update.gateways {
            gateway.code = normalize_gateway_code(&gateway.code);
            if gateway.code.is_empty() {
                continue;
            }
            gateway.name = gateway.name.trim().to_string();
            gateway.currencies = gateway
                .currencies
                .iter()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
            gateway.methods = gateway
                .methods
                .iter()
                .filter(|m| !m.trim().is_empty())
                .map(|m| normalize_payment_method(m))
                .collect();
            upsert(&mut self.gateways, gateway, |a, b| a.code == b.code);
        }

        for mut region in update.regions {
            region.gateways = region.gateways.iter().map(|g| normalize_gateway_code(g)).collect();
            upsert(&mut self.regions, region, |a, b| a.region == b.region);
        }

        for package in update.packages {
            if package.lkm_amount == 0 {
                continue;
            }
            upsert(&mut self.packages, package, |a, b| {
                a.region == b.region && a.lkm_amount == b.lkm_amount
            });
        }

        for mut cost in update.processing_costs {
            cost.gateway_code = normalize_gateway_code(&cost.gateway_code);
            if cost.gateway_code.is_empty() {
                continue;
            }
            cost.payment_method = normalize_payment_method(&cost.payment_method);
            upsert(&mut self.processing_costs, cost, |a, b| {
                a.gateway_code == b.gateway_code
                    && a.payment_method == b.payment_method
                    && a.region == b.region
            });
        }

        for mut fx in update.fx_rates {
            fx.currency = fx.currency.trim().to_uppercase();
            if fx.currency.is_empty() {
                continue;
            }
            fx.updated_by = Some(admin_id);
            fx.updated_at = Some(now);
            upsert(&mut self.fx_rates, fx, |a, b| a.currency == b.currency);
        }

        for mut tier in update.risk_tiers {
            tier.name = tier.name.trim().to_string();
            if tier.name.is_empty() {
                continue;
            }
            upsert(&mut self.risk_tiers, tier, |a, b| a.name == b.name);
        }

        if let Some(policy) = update.risk_policy {
            self.risk_policy = policy;
        }
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter().position(|existing| same(existing, &item)) {
        Some(index) => items[index] = item,
        None => items.push(item),
    }
}

/// Partial configuration submitted by an administrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub nominal_rub_per_lkm: Option<Decimal>,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub packages: Vec<PackageTier>,
    #[serde(default)]
    pub processing_costs: Vec<ProcessingCost>,
    #[serde(default)]
    pub fx_rates: Vec<FxRate>,
    #[serde(default)]
    pub risk_tiers: Vec<RiskTier>,
    #[serde(default)]
    pub risk_policy: Option<RiskPolicy>,
}
