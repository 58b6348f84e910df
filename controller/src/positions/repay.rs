use chrono::Utc;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{Asset, LoanStatus, TxKind, TxStatus};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::staking;
use crate::storage::{self, NewTx};
use crate::validation;

use super::borrow::loan_ltv;
use super::LoanEngine;

#[derive(Debug, Clone, Serialize)]
pub struct RepayOutcome {
    pub remaining_debt: Decimal,
    pub fully_repaid: bool,
}

impl LoanEngine {
    /// Repays up to `amount` against the loan's outstanding debt.
    ///
    /// Repayment is interest-first: accrued interest is cleared before any
    /// surplus touches the principal. Covering the whole debt closes the
    /// loan and returns the collateral to the owner's balance.
    pub async fn repay_loan(
        &self,
        loan_id: i64,
        user_id: i64,
        amount: Decimal,
    ) -> Result<RepayOutcome, LendingError> {
        validation::require_positive(amount)?;
        let prices = self.oracle.snapshot().await;

        let mut tx = self.ledger.begin().await?;
        let mut loan = storage::loan_by_id(&mut *tx, loan_id)
            .await?
            .ok_or(LendingError::NotFound("Loan"))?;
        if loan.user_id != user_id {
            return Err(LendingError::Unauthorised);
        }
        if loan.status.is_terminal() {
            return Err(LendingError::TerminalLoan);
        }

        let debt = loan.total_debt();
        let actual = amount.min(debt);
        let borrow_balance =
            storage::debit_balance(&mut *tx, user_id, loan.borrow_type, actual).await?;

        let now = Utc::now();
        let mut events = Vec::new();
        let fully_repaid = actual >= debt;
        if fully_repaid {
            let collateral_returned = loan.collateral_amount;
            let collateral_balance = storage::credit_balance(
                &mut *tx,
                user_id,
                loan.collateral_type,
                collateral_returned,
            )
            .await?;
            if loan.collateral_type == Asset::Xec {
                staking::pool_withdraw(&mut *tx, collateral_returned).await?;
            }
            loan.status = LoanStatus::Repaid;
            loan.collateral_amount = Decimal::ZERO;
            loan.borrow_amount = Decimal::ZERO;
            loan.accrued_interest = Decimal::ZERO;
            loan.closed_at = Some(now);
            events.push(Event::balance_update(
                user_id,
                loan.collateral_type,
                collateral_balance,
            ));
        } else if actual <= loan.accrued_interest {
            loan.accrued_interest -= actual;
        } else {
            let surplus = actual - loan.accrued_interest;
            loan.accrued_interest = Decimal::ZERO;
            loan.borrow_amount -= surplus;
        }

        if !loan.status.is_terminal() {
            loan.current_ltv = loan_ltv(&loan, &prices);
            if loan.status == LoanStatus::MarginCall && loan.current_ltv < self.params.margin_call_ltv
            {
                loan.status = LoanStatus::Active;
            }
            events.push(Event::ltv_update(
                loan.id,
                user_id,
                loan.current_ltv,
                loan.status,
            ));
        }
        loan.updated_at = now;
        storage::update_loan(&mut *tx, &loan).await?;
        storage::insert_tx(
            &mut *tx,
            NewTx {
                user_id,
                loan_id: Some(loan.id),
                kind: TxKind::Repay,
                asset: loan.borrow_type,
                amount: actual,
                value_usd: Some(prices.to_usd(loan.borrow_type, actual)),
                tx_hash: None,
                status: TxStatus::Confirmed,
            },
        )
        .await?;
        tx.commit().await?;

        events.push(Event::balance_update(user_id, loan.borrow_type, borrow_balance));
        self.bus.publish_all(&events);

        Ok(RepayOutcome {
            remaining_debt: debt - actual,
            fully_repaid,
        })
    }
}
