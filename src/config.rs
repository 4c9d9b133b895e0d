//! Engine settings: timing and paging knobs, separate from business configuration.

use clap::Args;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// How long an issued quote stays redeemable.
    pub quote_ttl: Duration,
    /// Upper bound on a gateway's checkout call during redemption.
    pub checkout_timeout: Duration,
    pub sweep_interval: Duration,
    pub user_page_default: u32,
    pub user_page_max: u32,
    pub admin_list_default: u32,
    pub admin_list_max: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(10 * 60),
            checkout_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
            user_page_default: 20,
            user_page_max: 100,
            admin_list_default: 50,
            admin_list_max: 200,
        }
    }
}

impl EngineSettings {
    /// Normalizes a user listing limit: out-of-range values fall back to the default.
    pub fn user_limit(&self, requested: u32) -> u32 {
        if requested == 0 || requested > self.user_page_max {
            self.user_page_default
        } else {
            requested
        }
    }

    pub fn admin_limit(&self, requested: u32) -> u32 {
        if requested == 0 || requested > self.admin_list_max {
            self.admin_list_default
        } else {
            requested
        }
    }
}

/// Command-line and environment overrides for [`EngineSettings`].
#[derive(Debug, Clone, Args)]
pub struct SettingsArgs {
    /// Quote time-to-live in seconds
    #[arg(long, env = "LKM_QUOTE_TTL_SECS", default_value_t = 600)]
    pub quote_ttl_secs: u64,

    /// Gateway checkout timeout in milliseconds
    #[arg(long, env = "LKM_CHECKOUT_TIMEOUT_MS", default_value_t = 10_000)]
    pub checkout_timeout_ms: u64,

    /// Interval between expired-quote sweeps in seconds
    #[arg(long, env = "LKM_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,
}

impl From<SettingsArgs> for EngineSettings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            quote_ttl: Duration::from_secs(args.quote_ttl_secs),
            checkout_timeout: Duration::from_millis(args.checkout_timeout_ms),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
            ..Self::default()
        }
    }
}
