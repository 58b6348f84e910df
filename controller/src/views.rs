//! Serialised views returned by the API surface. This is the boundary where
//! core decimals become floats; nothing inside the core computes on `f64`.

use chrono::{DateTime, Utc};
use common_structs::{Asset, EscrowWallet, Loan, StakingPool, TxRecord, User};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RiskParams;

fn f(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct BalancesView {
    pub xec: f64,
    pub firma: f64,
    pub xecx: f64,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub ecash_address: Option<String>,
    pub solana_address: Option<String>,
    pub balances: BalancesView,
    pub staking_rewards_earned: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            ecash_address: user.ecash_address.clone(),
            solana_address: user.solana_address.clone(),
            balances: BalancesView {
                xec: f(user.xec_balance),
                firma: f(user.firma_balance),
                xecx: f(user.xecx_balance),
            },
            staking_rewards_earned: f(user.staking_rewards_earned),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoanSideView {
    pub asset: Asset,
    pub amount: f64,
    pub value_usd_at_open: f64,
}

#[derive(Debug, Serialize)]
pub struct LoanView {
    pub id: i64,
    pub user_id: i64,
    pub status: &'static str,
    pub collateral: LoanSideView,
    pub borrowed: LoanSideView,
    pub interest_rate: f64,
    pub accrued_interest: f64,
    pub total_debt: f64,
    pub initial_ltv: f64,
    pub current_ltv: f64,
    pub staking_yield_earned: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id,
            user_id: loan.user_id,
            status: loan.status.as_str(),
            collateral: LoanSideView {
                asset: loan.collateral_type,
                amount: f(loan.collateral_amount),
                value_usd_at_open: f(loan.collateral_value_usd),
            },
            borrowed: LoanSideView {
                asset: loan.borrow_type,
                amount: f(loan.borrow_amount),
                value_usd_at_open: f(loan.borrow_value_usd),
            },
            interest_rate: f(loan.interest_rate),
            accrued_interest: f(loan.accrued_interest),
            total_debt: f(loan.total_debt()),
            initial_ltv: f(loan.initial_ltv),
            current_ltv: f(loan.current_ltv),
            staking_yield_earned: f(loan.staking_yield_earned),
            created_at: loan.created_at,
            updated_at: loan.updated_at,
            closed_at: loan.closed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TxView {
    pub id: i64,
    pub user_id: i64,
    pub loan_id: Option<i64>,
    pub kind: &'static str,
    pub asset: Asset,
    pub amount: f64,
    pub value_usd: Option<f64>,
    pub tx_hash: Option<String>,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

impl From<&TxRecord> for TxView {
    fn from(record: &TxRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            loan_id: record.loan_id,
            kind: record.kind.as_str(),
            asset: record.asset,
            amount: f(record.amount),
            value_usd: record.value_usd.map(f),
            tx_hash: record.tx_hash.clone(),
            status: record.status.as_str(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StakingStatsView {
    pub platform_base: f64,
    pub user_contributed: f64,
    pub total: f64,
    pub total_rewards_distributed: f64,
    pub last_reward_distribution: Option<DateTime<Utc>>,
    pub daily_yield_rate: f64,
}

impl StakingStatsView {
    pub fn new(pool: &StakingPool, params: &RiskParams) -> Self {
        Self {
            platform_base: f(pool.platform_base),
            user_contributed: f(pool.user_contributed),
            total: f(pool.total),
            total_rewards_distributed: f(pool.total_rewards_distributed),
            last_reward_distribution: pool.last_reward_distribution,
            daily_yield_rate: f(params.daily_yield_rate),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoanConfigView {
    pub initial_ltv: f64,
    pub margin_call_ltv: f64,
    pub liquidation_ltv: f64,
    pub hourly_interest_rate: f64,
    pub liquidation_fee: f64,
    pub effective_hourly_rate: f64,
    pub supported_collateral: Vec<Asset>,
    pub supported_borrow: Vec<Asset>,
    pub staking_stats: StakingStatsView,
}

impl LoanConfigView {
    pub fn new(params: &RiskParams, pool: &StakingPool) -> Self {
        Self {
            initial_ltv: f(params.initial_ltv),
            margin_call_ltv: f(params.margin_call_ltv),
            liquidation_ltv: f(params.liquidation_ltv),
            hourly_interest_rate: f(params.hourly_interest_rate),
            liquidation_fee: f(params.liquidation_fee),
            effective_hourly_rate: f(params.effective_hourly_rate()),
            supported_collateral: Asset::COLLATERAL.to_vec(),
            supported_borrow: Asset::BORROWABLE.to_vec(),
            staking_stats: StakingStatsView::new(pool, params),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PricesView {
    pub prices: BTreeMap<Asset, f64>,
    pub timestamp: DateTime<Utc>,
}

impl PricesView {
    pub fn new(prices: impl IntoIterator<Item = (Asset, Decimal)>) -> Self {
        Self {
            prices: prices.into_iter().map(|(asset, price)| (asset, f(price))).collect(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalculateView {
    pub max_borrow: f64,
    pub collateral_value_usd: f64,
    pub ltv: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RepayView {
    pub remaining_debt: f64,
    pub fully_repaid: bool,
}

impl From<&crate::positions::RepayOutcome> for RepayView {
    fn from(outcome: &crate::positions::RepayOutcome) -> Self {
        Self {
            remaining_debt: f(outcome.remaining_debt),
            fully_repaid: outcome.fully_repaid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub users: i64,
    pub open_loans: usize,
    pub total_collateral_usd: f64,
    pub total_borrowed_usd: f64,
    pub staking: StakingStatsView,
}

#[derive(Debug, Serialize)]
pub struct EscrowWalletView {
    pub chain: &'static str,
    pub address: String,
    pub asset: Asset,
    pub balance: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<&EscrowWallet> for EscrowWalletView {
    fn from(wallet: &EscrowWallet) -> Self {
        Self {
            chain: wallet.chain.as_str(),
            address: wallet.address.clone(),
            asset: wallet.asset,
            balance: f(wallet.balance),
            updated_at: wallet.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EscrowSummaryView {
    pub wallets: usize,
    pub totals: BTreeMap<Asset, f64>,
}

impl EscrowSummaryView {
    pub fn new(wallets: &[EscrowWallet]) -> Self {
        let mut totals: BTreeMap<Asset, Decimal> = BTreeMap::new();
        for wallet in wallets {
            *totals.entry(wallet.asset).or_default() += wallet.balance;
        }
        Self {
            wallets: wallets.len(),
            totals: totals.into_iter().map(|(asset, total)| (asset, f(total))).collect(),
        }
    }
}
