use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of tracked assets.
///
/// `XECX` is the staking-wrapped form of the native coin and shadows its
/// price. Balance columns are resolved through [`Asset::balance_column`];
/// asset names never reach SQL as interpolated input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Asset {
    Xec,
    Firma,
    Xecx,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Xec, Asset::Firma, Asset::Xecx];

    /// Assets accepted as loan collateral.
    pub const COLLATERAL: [Asset; 2] = [Asset::Xec, Asset::Firma];

    /// Assets that can be borrowed.
    pub const BORROWABLE: [Asset; 2] = [Asset::Xec, Asset::Firma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Xec => "XEC",
            Asset::Firma => "FIRMA",
            Asset::Xecx => "XECX",
        }
    }

    /// Static asset-to-column mapping for the users table.
    pub fn balance_column(&self) -> &'static str {
        match self {
            Asset::Xec => "xec_balance",
            Asset::Firma => "firma_balance",
            Asset::Xecx => "xecx_balance",
        }
    }

    pub fn parse(raw: &str) -> Option<Asset> {
        match raw.to_ascii_uppercase().as_str() {
            "XEC" => Some(Asset::Xec),
            "FIRMA" => Some(Asset::Firma),
            "XECX" => Some(Asset::Xecx),
            _ => None,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chains a user can attach an address for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum WalletKind {
    Ecash,
    Solana,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Ecash => "ecash",
            WalletKind::Solana => "solana",
        }
    }

    /// Static chain-to-column mapping for the users table.
    pub fn address_column(&self) -> &'static str {
        match self {
            WalletKind::Ecash => "ecash_address",
            WalletKind::Solana => "solana_address",
        }
    }

    pub fn parse(raw: &str) -> Option<WalletKind> {
        match raw.to_ascii_lowercase().as_str() {
            "ecash" | "xec" => Some(WalletKind::Ecash),
            "solana" => Some(WalletKind::Solana),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub ecash_address: Option<String>,
    pub solana_address: Option<String>,
    pub xec_balance: Decimal,
    pub firma_balance: Decimal,
    pub xecx_balance: Decimal,
    pub staking_rewards_earned: Decimal,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn balance(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Xec => self.xec_balance,
            Asset::Firma => self.firma_balance,
            Asset::Xecx => self.xecx_balance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    MarginCall,
    Repaid,
    Liquidated,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::MarginCall => "margin_call",
            LoanStatus::Repaid => "repaid",
            LoanStatus::Liquidated => "liquidated",
        }
    }

    /// Terminal loans hold no collateral, no debt and carry a close stamp.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Repaid | LoanStatus::Liquidated)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Loan {
    pub id: i64,
    pub user_id: i64,
    pub status: LoanStatus,
    pub collateral_type: Asset,
    pub collateral_amount: Decimal,
    pub collateral_value_usd: Decimal,
    pub borrow_type: Asset,
    pub borrow_amount: Decimal,
    pub borrow_value_usd: Decimal,
    /// Per-hour interest fraction locked at creation.
    pub interest_rate: Decimal,
    pub accrued_interest: Decimal,
    pub initial_ltv: Decimal,
    pub current_ltv: Decimal,
    pub staking_yield_earned: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_interest_update: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn total_debt(&self) -> Decimal {
        self.borrow_amount + self.accrued_interest
    }

    /// Loans backed by the native coin participate in the staking pool.
    pub fn is_staking_backed(&self) -> bool {
        self.collateral_type == Asset::Xec && !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TxKind {
    DepositXec,
    DepositFirma,
    Borrow,
    Repay,
    AddCollateral,
    Liquidation,
    InterestPayment,
    StakingReward,
    FirmaSwap,
    WithdrawXec,
    WithdrawFirma,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::DepositXec => "deposit_xec",
            TxKind::DepositFirma => "deposit_firma",
            TxKind::Borrow => "borrow",
            TxKind::Repay => "repay",
            TxKind::AddCollateral => "add_collateral",
            TxKind::Liquidation => "liquidation",
            TxKind::InterestPayment => "interest_payment",
            TxKind::StakingReward => "staking_reward",
            TxKind::FirmaSwap => "firma_swap",
            TxKind::WithdrawXec => "withdraw_xec",
            TxKind::WithdrawFirma => "withdraw_firma",
        }
    }

    /// Kinds surfaced by the deposit history endpoint.
    pub fn is_deposit(&self) -> bool {
        matches!(
            self,
            TxKind::DepositXec | TxKind::DepositFirma | TxKind::FirmaSwap
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

/// Append-only record of a state-changing financial action.
#[derive(Debug, Clone, Serialize)]
pub struct TxRecord {
    pub id: i64,
    pub user_id: i64,
    pub loan_id: Option<i64>,
    pub kind: TxKind,
    pub asset: Asset,
    pub amount: Decimal,
    pub value_usd: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
}

/// Singleton pool backing the daily borrower yield.
#[derive(Debug, Clone, Serialize)]
pub struct StakingPool {
    pub platform_base: Decimal,
    pub user_contributed: Decimal,
    pub total: Decimal,
    pub last_reward_distribution: Option<DateTime<Utc>>,
    pub total_rewards_distributed: Decimal,
}

/// Platform-controlled address surfaced for transparency reporting.
/// Observed balances only; never authoritative for user funds.
#[derive(Debug, Clone, Serialize)]
pub struct EscrowWallet {
    pub id: i64,
    pub chain: WalletKind,
    pub address: String,
    pub asset: Asset,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    Critical,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Warning => "warning",
            AlertType::Critical => "critical",
        }
    }
}

/// Append-only log entry for every LTV crossing into the margin band.
#[derive(Debug, Clone, Serialize)]
pub struct MarginCallEntry {
    pub id: i64,
    pub loan_id: i64,
    pub user_id: i64,
    pub ltv: Decimal,
    pub alert_type: AlertType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PriceSource {
    Feed,
    Cache,
    Default,
    Pegged,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    pub asset: Asset,
    pub price_usd: Decimal,
    pub source: PriceSource,
    pub updated_at: DateTime<Utc>,
}
