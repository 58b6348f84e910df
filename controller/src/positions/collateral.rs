use chrono::Utc;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{Asset, Loan, LoanStatus, TxKind, TxStatus};
use rust_decimal::Decimal;

use crate::staking;
use crate::storage::{self, NewTx};
use crate::validation;

use super::borrow::loan_ltv;
use super::LoanEngine;

impl LoanEngine {
    /// Moves more of the collateral asset from the owner's balance into the
    /// loan, lowering its LTV. A loan under margin call recovers to active
    /// once the fresh LTV is back below the margin-call band.
    pub async fn add_collateral(
        &self,
        loan_id: i64,
        user_id: i64,
        amount: Decimal,
    ) -> Result<Loan, LendingError> {
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

        let balance =
            storage::debit_balance(&mut *tx, user_id, loan.collateral_type, amount).await?;
        loan.collateral_amount += amount;
        loan.current_ltv = loan_ltv(&loan, &prices);
        if loan.status == LoanStatus::MarginCall && loan.current_ltv < self.params.margin_call_ltv {
            loan.status = LoanStatus::Active;
        }
        loan.updated_at = Utc::now();
        storage::update_loan(&mut *tx, &loan).await?;
        storage::insert_tx(
            &mut *tx,
            NewTx {
                user_id,
                loan_id: Some(loan.id),
                kind: TxKind::AddCollateral,
                asset: loan.collateral_type,
                amount,
                value_usd: Some(prices.to_usd(loan.collateral_type, amount)),
                tx_hash: None,
                status: TxStatus::Confirmed,
            },
        )
        .await?;
        if loan.collateral_type == Asset::Xec {
            staking::pool_contribute(&mut *tx, amount).await?;
        }
        tx.commit().await?;

        self.bus.publish_all(&[
            Event::balance_update(user_id, loan.collateral_type, balance),
            Event::ltv_update(loan.id, user_id, loan.current_ltv, loan.status),
        ]);
        Ok(loan)
    }
}
