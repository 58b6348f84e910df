use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Maximum loan-to-value at loan creation, in percent.
pub const DEFAULT_INITIAL_LTV: Decimal = dec!(65);

/// LTV at which a loan enters the margin-call band, in percent.
pub const DEFAULT_MARGIN_CALL_LTV: Decimal = dec!(75);

/// LTV at which the risk loop liquidates, in percent.
pub const DEFAULT_LIQUIDATION_LTV: Decimal = dec!(83);

/// Margin calls at or above this LTV are flagged critical instead of warning.
pub const CRITICAL_ALERT_LTV: Decimal = dec!(80);

/// LTV reported for a loan whose collateral no longer has any value.
pub const FULLY_UNDERWATER_LTV: Decimal = dec!(100);

/// Interest charged on the outstanding principal, per hour.
pub const DEFAULT_HOURLY_INTEREST_RATE: Decimal = dec!(0.0001);

/// Fee taken on the recovered debt during liquidation. 2%
pub const DEFAULT_LIQUIDATION_FEE: Decimal = dec!(0.02);

/// Share of the staking pool paid out per day. ~3.65% APY
pub const DEFAULT_DAILY_YIELD_RATE: Decimal = dec!(0.0001);

/// Platform-seeded portion of the staking pool.
pub const STAKING_PLATFORM_BASE: Decimal = dec!(50000);

pub const DEFAULT_XEC_PRICE: Decimal = dec!(0.00003);

/// FIRMA is pegged and never read from any cache.
pub const FIRMA_PEG_PRICE: Decimal = dec!(1.0);

/// Memory price cache freshness window.
pub const PRICE_TTL_SECS: u64 = 60;

/// External feed timeout before falling back to the durable cache.
pub const PRICE_FETCH_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_FEED_URL: &str = "https://api.coingecko.com/api/v3";

pub const DEFAULT_DATABASE_PATH: &str = "./data/loanzzz.db";

pub const DEFAULT_PORT: u16 = 3001;

/// Oracle refresh, LTV recompute and escrow reconciliation cadence.
pub const PRICE_TICK_SECS: u64 = 60;

/// Liquidation scan cadence.
pub const RISK_TICK_SECS: u64 = 60;

/// Interest accrual cadence.
pub const INTEREST_TICK_SECS: u64 = 3_600;

pub const SECONDS_PER_HOUR: i64 = 3_600;
