use chrono::Utc;
use common_constants::FULLY_UNDERWATER_LTV;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{Asset, Loan, LoanStatus, TxKind, TxStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::oracle::PriceSnapshot;
use crate::staking;
use crate::storage::{self, NewTx};
use crate::validation;

use super::LoanEngine;

/// Loan-to-value in percent for a debt of `principal + accrued` against
/// `collateral_amount` of collateral, at the given prices.
///
/// Worthless collateral reads as fully underwater; values past that are
/// clamped to the same ceiling, since anything in that region is swept by
/// the next risk scan regardless.
pub fn ltv_percent(
    borrow_price: Decimal,
    principal: Decimal,
    accrued: Decimal,
    collateral_price: Decimal,
    collateral_amount: Decimal,
) -> Decimal {
    let collateral_value = collateral_amount * collateral_price;
    if collateral_value <= Decimal::ZERO {
        return FULLY_UNDERWATER_LTV;
    }
    let debt_value = (principal + accrued) * borrow_price;
    ((debt_value / collateral_value) * dec!(100)).min(FULLY_UNDERWATER_LTV)
}

/// Maximum borrowable amount for the given collateral at the initial LTV
/// cap. Zero when the borrow asset has no price.
pub fn max_borrow(
    collateral_price: Decimal,
    collateral_amount: Decimal,
    borrow_price: Decimal,
    initial_ltv: Decimal,
) -> Decimal {
    if borrow_price.is_zero() {
        return Decimal::ZERO;
    }
    collateral_amount * collateral_price * (initial_ltv / dec!(100)) / borrow_price
}

impl LoanEngine {
    pub async fn calculate_max_borrow(
        &self,
        collateral_type: Asset,
        collateral_amount: Decimal,
        borrow_type: Asset,
    ) -> Decimal {
        let prices = self.oracle.snapshot().await;
        max_borrow(
            prices.price(collateral_type),
            collateral_amount,
            prices.price(borrow_type),
            self.params.initial_ltv,
        )
    }

    pub async fn calculate_ltv(
        &self,
        borrow_type: Asset,
        principal: Decimal,
        accrued: Decimal,
        collateral_type: Asset,
        collateral_amount: Decimal,
    ) -> Decimal {
        let prices = self.oracle.snapshot().await;
        ltv_percent(
            prices.price(borrow_type),
            principal,
            accrued,
            prices.price(collateral_type),
            collateral_amount,
        )
    }

    /// Opens a loan: debits the collateral, credits the borrowed asset and
    /// records the position, all in one unit of work.
    pub async fn create_loan(
        &self,
        user_id: i64,
        collateral_type: Asset,
        collateral_amount: Decimal,
        borrow_type: Asset,
        borrow_amount: Decimal,
    ) -> Result<Loan, LendingError> {
        validation::require_positive(collateral_amount)?;
        validation::require_positive(borrow_amount)?;
        validation::require_collateral_asset(collateral_type)?;
        validation::require_borrowable_asset(borrow_type)?;

        let prices = self.oracle.snapshot().await;
        let ltv = ltv_percent(
            prices.price(borrow_type),
            borrow_amount,
            Decimal::ZERO,
            prices.price(collateral_type),
            collateral_amount,
        );
        if ltv > self.params.initial_ltv {
            return Err(LendingError::LtvExceeded {
                ltv,
                max: self.params.initial_ltv,
            });
        }

        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;
        let collateral_balance =
            storage::debit_balance(&mut *tx, user_id, collateral_type, collateral_amount).await?;
        let borrow_balance =
            storage::credit_balance(&mut *tx, user_id, borrow_type, borrow_amount).await?;
        let loan = storage::insert_loan(
            &mut *tx,
            &Loan {
                id: 0,
                user_id,
                status: LoanStatus::Active,
                collateral_type,
                collateral_amount,
                collateral_value_usd: prices.to_usd(collateral_type, collateral_amount),
                borrow_type,
                borrow_amount,
                borrow_value_usd: prices.to_usd(borrow_type, borrow_amount),
                interest_rate: self.params.hourly_interest_rate,
                accrued_interest: Decimal::ZERO,
                initial_ltv: ltv,
                current_ltv: ltv,
                staking_yield_earned: Decimal::ZERO,
                created_at: now,
                updated_at: now,
                last_interest_update: now,
                closed_at: None,
            },
        )
        .await?;
        storage::insert_tx(
            &mut *tx,
            NewTx {
                user_id,
                loan_id: Some(loan.id),
                kind: TxKind::Borrow,
                asset: borrow_type,
                amount: borrow_amount,
                value_usd: Some(prices.to_usd(borrow_type, borrow_amount)),
                tx_hash: None,
                status: TxStatus::Confirmed,
            },
        )
        .await?;
        if collateral_type == Asset::Xec {
            staking::pool_contribute(&mut *tx, collateral_amount).await?;
        }
        tx.commit().await?;

        self.bus.publish_all(&[
            Event::balance_update(user_id, collateral_type, collateral_balance),
            Event::balance_update(user_id, borrow_type, borrow_balance),
            Event::ltv_update(loan.id, user_id, loan.current_ltv, loan.status),
        ]);
        Ok(loan)
    }
}

/// LTV of an existing loan at the given prices.
pub fn loan_ltv(loan: &Loan, prices: &PriceSnapshot) -> Decimal {
    ltv_percent(
        prices.price(loan.borrow_type),
        loan.borrow_amount,
        loan.accrued_interest,
        prices.price(loan.collateral_type),
        loan.collateral_amount,
    )
}
