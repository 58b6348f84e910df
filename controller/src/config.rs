use std::env;
use std::str::FromStr;

use common_constants as constants;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Risk thresholds and rates shared by the loan engine, the risk loop and
/// the staking distributor. Read once at startup and handed to components at
/// construction.
#[derive(Debug, Clone)]
pub struct RiskParams {
    /// Maximum LTV at loan creation, percent.
    pub initial_ltv: Decimal,
    /// Entry into the margin-call band, percent.
    pub margin_call_ltv: Decimal,
    /// Liquidation trigger, percent.
    pub liquidation_ltv: Decimal,
    /// Per-hour interest fraction.
    pub hourly_interest_rate: Decimal,
    /// Fee taken on recovered debt at liquidation, fraction.
    pub liquidation_fee: Decimal,
    /// Share of the staking pool paid out per day, fraction.
    pub daily_yield_rate: Decimal,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            initial_ltv: constants::DEFAULT_INITIAL_LTV,
            margin_call_ltv: constants::DEFAULT_MARGIN_CALL_LTV,
            liquidation_ltv: constants::DEFAULT_LIQUIDATION_LTV,
            hourly_interest_rate: constants::DEFAULT_HOURLY_INTEREST_RATE,
            liquidation_fee: constants::DEFAULT_LIQUIDATION_FEE,
            daily_yield_rate: constants::DEFAULT_DAILY_YIELD_RATE,
        }
    }
}

impl RiskParams {
    /// Hourly borrow cost net of the staking yield, floored at zero.
    pub fn effective_hourly_rate(&self) -> Decimal {
        (self.hourly_interest_rate - self.daily_yield_rate / dec!(24)).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_url: Option<String>,
    pub database_path: String,
    pub feed_url: String,
    pub escrow_xec_address: Option<String>,
    pub escrow_solana_address: Option<String>,
    pub indexer_url: Option<String>,
    pub risk: RiskParams,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", constants::DEFAULT_PORT),
            frontend_url: env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| constants::DEFAULT_DATABASE_PATH.to_owned()),
            feed_url: env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| constants::DEFAULT_FEED_URL.to_owned()),
            escrow_xec_address: env::var("ESCROW_XEC_ADDRESS").ok().filter(|v| !v.is_empty()),
            escrow_solana_address: env::var("ESCROW_SOLANA_ADDRESS")
                .ok()
                .filter(|v| !v.is_empty()),
            indexer_url: env::var("ESCROW_INDEXER_URL").ok().filter(|v| !v.is_empty()),
            risk: RiskParams {
                initial_ltv: env_decimal("INITIAL_LTV", constants::DEFAULT_INITIAL_LTV),
                margin_call_ltv: env_decimal("MARGIN_CALL_LTV", constants::DEFAULT_MARGIN_CALL_LTV),
                liquidation_ltv: env_decimal("LIQUIDATION_LTV", constants::DEFAULT_LIQUIDATION_LTV),
                hourly_interest_rate: env_decimal(
                    "HOURLY_INTEREST_RATE",
                    constants::DEFAULT_HOURLY_INTEREST_RATE,
                ),
                liquidation_fee: env_decimal(
                    "LIQUIDATION_FEE",
                    constants::DEFAULT_LIQUIDATION_FEE,
                ),
                daily_yield_rate: env_decimal(
                    "DAILY_YIELD_RATE",
                    constants::DEFAULT_DAILY_YIELD_RATE,
                ),
            },
        }
    }
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|raw| Decimal::from_str(&raw).ok())
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
