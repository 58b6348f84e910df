//! The loan engine: creation, repayment, collateral management, interest
//! accrual and LTV upkeep. One atomic ledger transaction per operation;
//! prices are snapshotted before the transaction opens and notifications go
//! out only after it commits.

pub mod borrow;
pub mod collateral;
pub mod liquidation;
pub mod repay;
pub mod update;

use std::sync::Arc;

use crate::config::RiskParams;
use crate::oracle::PriceOracle;
use crate::storage::Ledger;
use crate::ws::NotificationBus;

pub use liquidation::{LiquidationSummary, RiskEngine};
pub use repay::RepayOutcome;

pub struct LoanEngine {
    pub(crate) ledger: Ledger,
    pub(crate) oracle: Arc<PriceOracle>,
    pub(crate) bus: Arc<NotificationBus>,
    pub(crate) params: RiskParams,
}

impl LoanEngine {
    pub fn new(
        ledger: Ledger,
        oracle: Arc<PriceOracle>,
        bus: Arc<NotificationBus>,
        params: RiskParams,
    ) -> Self {
        Self {
            ledger,
            oracle,
            bus,
            params,
        }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }
}
