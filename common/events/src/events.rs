use chrono::Utc;
use common_structs::{AlertType, Asset, LoanStatus};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Core decimals leave the bus as floats; this is the only place the
/// conversion happens for push payloads.
fn f(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceUpdate {
    pub user_id: i64,
    pub asset: Asset,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LtvUpdate {
    pub loan_id: i64,
    pub user_id: i64,
    pub ltv: f64,
    pub status: LoanStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarginCallAlert {
    pub loan_id: i64,
    pub user_id: i64,
    pub ltv: f64,
    pub alert_type: AlertType,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationNotice {
    pub loan_id: i64,
    pub user_id: i64,
    pub asset: Asset,
    pub sold: f64,
    pub debt_covered: f64,
    pub fee: f64,
    pub returned: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StakingRewardNotice {
    pub user_id: i64,
    pub amount: f64,
    pub total_earned: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscrowObservation {
    pub chain: String,
    pub address: String,
    pub asset: Asset,
    pub balance: f64,
}

/// Everything the notification bus can carry.
///
/// Per-user events resolve a recipient through [`Event::user_id`]; broadcast
/// events return `None` there and fan out to every open channel.
#[derive(Debug, Clone)]
pub enum Event {
    BalanceUpdate(BalanceUpdate),
    LtvUpdate(LtvUpdate),
    MarginCall(MarginCallAlert),
    Liquidation(LiquidationNotice),
    StakingReward(StakingRewardNotice),
    PricesUpdate(BTreeMap<Asset, f64>),
    EscrowTransaction(EscrowObservation),
}

impl Event {
    pub fn balance_update(user_id: i64, asset: Asset, balance: Decimal) -> Self {
        Event::BalanceUpdate(BalanceUpdate {
            user_id,
            asset,
            balance: f(balance),
        })
    }

    pub fn ltv_update(loan_id: i64, user_id: i64, ltv: Decimal, status: LoanStatus) -> Self {
        Event::LtvUpdate(LtvUpdate {
            loan_id,
            user_id,
            ltv: f(ltv),
            status,
        })
    }

    pub fn margin_call(loan_id: i64, user_id: i64, ltv: Decimal, alert_type: AlertType) -> Self {
        Event::MarginCall(MarginCallAlert {
            loan_id,
            user_id,
            ltv: f(ltv),
            alert_type,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn liquidation(
        loan_id: i64,
        user_id: i64,
        asset: Asset,
        sold: Decimal,
        debt_covered: Decimal,
        fee: Decimal,
        returned: Decimal,
    ) -> Self {
        Event::Liquidation(LiquidationNotice {
            loan_id,
            user_id,
            asset,
            sold: f(sold),
            debt_covered: f(debt_covered),
            fee: f(fee),
            returned: f(returned),
        })
    }

    pub fn staking_reward(user_id: i64, amount: Decimal, total_earned: Decimal) -> Self {
        Event::StakingReward(StakingRewardNotice {
            user_id,
            amount: f(amount),
            total_earned: f(total_earned),
        })
    }

    pub fn prices_update(prices: impl IntoIterator<Item = (Asset, Decimal)>) -> Self {
        Event::PricesUpdate(prices.into_iter().map(|(a, p)| (a, f(p))).collect())
    }

    pub fn escrow_transaction(
        chain: &str,
        address: &str,
        asset: Asset,
        balance: Decimal,
    ) -> Self {
        Event::EscrowTransaction(EscrowObservation {
            chain: chain.to_owned(),
            address: address.to_owned(),
            asset,
            balance: f(balance),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::BalanceUpdate(_) => "balance:update",
            Event::LtvUpdate(_) => "loan:ltv:update",
            Event::MarginCall(_) => "loan:margin-call",
            Event::Liquidation(_) => "loan:liquidation",
            Event::StakingReward(_) => "staking:reward",
            Event::PricesUpdate(_) => "prices:update",
            Event::EscrowTransaction(_) => "escrow:transaction",
        }
    }

    /// Recipient for per-user events; `None` broadcasts.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Event::BalanceUpdate(e) => Some(e.user_id),
            Event::LtvUpdate(e) => Some(e.user_id),
            Event::MarginCall(e) => Some(e.user_id),
            Event::Liquidation(e) => Some(e.user_id),
            Event::StakingReward(e) => Some(e.user_id),
            Event::PricesUpdate(_) | Event::EscrowTransaction(_) => None,
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            Event::BalanceUpdate(e) => json!(e),
            Event::LtvUpdate(e) => json!(e),
            Event::MarginCall(e) => json!(e),
            Event::Liquidation(e) => json!(e),
            Event::StakingReward(e) => json!(e),
            Event::PricesUpdate(prices) => json!({ "prices": prices }),
            Event::EscrowTransaction(e) => json!(e),
        }
    }

    /// Wire frame pushed to subscribers.
    pub fn frame(&self) -> serde_json::Value {
        json!({
            "type": self.kind(),
            "data": self.data(),
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}
