//! The risk loop: scans open loans at fresh prices and closes any position
//! at or past the liquidation band. All-or-nothing per loan; residual bad
//! debt is accepted and the liquidation recorded regardless.

use std::sync::Arc;

use chrono::Utc;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{Asset, Loan, LoanStatus, TxKind, TxStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskParams;
use crate::oracle::{PriceOracle, PriceSnapshot};
use crate::staking;
use crate::storage::{self, Ledger, NewTx};
use crate::ws::NotificationBus;

use super::borrow::loan_ltv;

#[derive(Debug, Clone)]
pub struct LiquidationSummary {
    pub loan_id: i64,
    pub user_id: i64,
    pub collateral_type: Asset,
    /// Collateral sold to cover debt plus fee, in collateral units.
    pub sold: Decimal,
    pub debt_covered_usd: Decimal,
    pub fee_usd: Decimal,
    /// Fee expressed in collateral units, carved out of the sold amount.
    pub fee_in_collateral: Decimal,
    /// Residual collateral credited back to the owner.
    pub returned: Decimal,
}

pub struct RiskEngine {
    ledger: Ledger,
    oracle: Arc<PriceOracle>,
    bus: Arc<NotificationBus>,
    params: RiskParams,
}

impl RiskEngine {
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

    /// Enumerates open loans, recomputes their LTV at one price snapshot and
    /// liquidates every loan at or past the liquidation band.
    pub async fn scan_and_liquidate(&self) -> Result<Vec<LiquidationSummary>, LendingError> {
        let prices = self.oracle.snapshot().await;
        let mut conn = self.ledger.pool().acquire().await?;
        let loans = storage::open_loans(&mut conn).await?;
        drop(conn);

        let mut liquidated = Vec::new();
        for loan in loans {
            if loan_ltv(&loan, &prices) >= self.params.liquidation_ltv {
                match self.liquidate(&loan, &prices).await {
                    Ok(summary) => liquidated.push(summary),
                    Err(err) => {
                        tracing::error!(loan = loan.id, error = %err, "liquidation failed");
                    }
                }
            }
        }
        Ok(liquidated)
    }

    /// Closes one underwater loan: sells enough collateral to recover the
    /// debt plus the liquidation fee, returns the remainder to the owner and
    /// records the event. Runs as a single unit of work.
    async fn liquidate(
        &self,
        loan: &Loan,
        prices: &PriceSnapshot,
    ) -> Result<LiquidationSummary, LendingError> {
        let total_debt = loan.total_debt();
        let debt_usd = prices.to_usd(loan.borrow_type, total_debt);
        let fee_usd = debt_usd * self.params.liquidation_fee;
        let recover_usd = debt_usd + fee_usd;

        let collateral_price = prices.price(loan.collateral_type);
        let sold = if collateral_price.is_zero() {
            loan.collateral_amount
        } else {
            (recover_usd / collateral_price).min(loan.collateral_amount)
        };
        let returned = (loan.collateral_amount - sold).max(Decimal::ZERO);
        let fee_in_collateral =
            sold * self.params.liquidation_fee / (dec!(1) + self.params.liquidation_fee);

        let mut tx = self.ledger.begin().await?;
        let mut loan = match storage::loan_by_id(&mut *tx, loan.id).await? {
            Some(fresh) if !fresh.status.is_terminal() => fresh,
            _ => return Err(LendingError::TerminalLoan),
        };
        let original_collateral = loan.collateral_amount;

        loan.status = LoanStatus::Liquidated;
        loan.collateral_amount = Decimal::ZERO;
        loan.borrow_amount = Decimal::ZERO;
        loan.accrued_interest = Decimal::ZERO;
        loan.closed_at = Some(Utc::now());
        loan.updated_at = Utc::now();
        storage::update_loan(&mut *tx, &loan).await?;

        let mut events = Vec::new();
        if returned > Decimal::ZERO {
            let balance =
                storage::credit_balance(&mut *tx, loan.user_id, loan.collateral_type, returned)
                    .await?;
            events.push(Event::balance_update(
                loan.user_id,
                loan.collateral_type,
                balance,
            ));
        }
        if loan.collateral_type == Asset::Xec {
            staking::pool_withdraw(&mut *tx, original_collateral).await?;
        }
        storage::insert_tx(
            &mut *tx,
            NewTx {
                user_id: loan.user_id,
                loan_id: Some(loan.id),
                kind: TxKind::Liquidation,
                asset: loan.collateral_type,
                amount: sold,
                value_usd: Some(recover_usd),
                tx_hash: None,
                status: TxStatus::Confirmed,
            },
        )
        .await?;
        tx.commit().await?;

        events.push(Event::liquidation(
            loan.id,
            loan.user_id,
            loan.collateral_type,
            sold,
            debt_usd,
            fee_in_collateral,
            returned,
        ));
        self.bus.publish_all(&events);

        Ok(LiquidationSummary {
            loan_id: loan.id,
            user_id: loan.user_id,
            collateral_type: loan.collateral_type,
            sold,
            debt_covered_usd: debt_usd,
            fee_usd,
            fee_in_collateral,
            returned,
        })
    }

    /// Open loans already inside the margin band, most underwater first.
    pub async fn loans_at_risk(&self) -> Result<Vec<Loan>, LendingError> {
        let mut conn = self.ledger.pool().acquire().await?;
        let mut loans = storage::open_loans(&mut conn).await?;
        loans.retain(|loan| loan.current_ltv >= self.params.margin_call_ltv);
        loans.sort_by(|a, b| b.current_ltv.cmp(&a.current_ltv));
        Ok(loans)
    }
}
