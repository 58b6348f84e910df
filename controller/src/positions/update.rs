use chrono::{Duration, Utc};
use common_constants::CRITICAL_ALERT_LTV;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{AlertType, Loan, LoanStatus, TxKind, TxStatus};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::storage::{self, NewTx};

use super::borrow::loan_ltv;
use super::LoanEngine;

/// Logs the margin-band entry, flips the loan into margin call and queues
/// the alert. Critical above the critical threshold, warning below.
pub(crate) async fn trigger_margin_call(
    conn: &mut SqliteConnection,
    loan: &mut Loan,
    ltv: Decimal,
    events: &mut Vec<Event>,
) -> Result<(), LendingError> {
    let alert_type = if ltv >= CRITICAL_ALERT_LTV {
        AlertType::Critical
    } else {
        AlertType::Warning
    };
    storage::insert_margin_call(conn, loan.id, loan.user_id, ltv, alert_type).await?;
    loan.status = LoanStatus::MarginCall;
    events.push(Event::margin_call(loan.id, loan.user_id, ltv, alert_type));
    Ok(())
}

impl LoanEngine {
    /// Accrues interest for whole elapsed hours since the loan's last
    /// accrual. Less than one full hour is a no-op, which also makes the
    /// hourly tick idempotent against overlap.
    pub async fn accrue_interest(&self, loan_id: i64) -> Result<Option<Loan>, LendingError> {
        let prices = self.oracle.snapshot().await;

        let mut tx = self.ledger.begin().await?;
        let mut loan = match storage::loan_by_id(&mut *tx, loan_id).await? {
            Some(loan) if !loan.status.is_terminal() => loan,
            _ => return Ok(None),
        };
        let hours = Utc::now()
            .signed_duration_since(loan.last_interest_update)
            .num_hours();
        if hours < 1 {
            return Ok(Some(loan));
        }

        let interest = loan.borrow_amount * loan.interest_rate * Decimal::from(hours);
        loan.accrued_interest += interest;
        // Advance by whole hours only, so the fractional remainder keeps
        // accruing from the correct instant.
        loan.last_interest_update += Duration::hours(hours);
        loan.current_ltv = loan_ltv(&loan, &prices);
        loan.updated_at = Utc::now();

        let mut events = Vec::new();
        let entered_band = loan.status == LoanStatus::Active
            && loan.current_ltv >= self.params.margin_call_ltv
            && loan.current_ltv < self.params.liquidation_ltv;
        if entered_band {
            let current_ltv = loan.current_ltv;
            trigger_margin_call(&mut *tx, &mut loan, current_ltv, &mut events).await?;
        }
        storage::update_loan(&mut *tx, &loan).await?;
        storage::insert_tx(
            &mut *tx,
            NewTx {
                user_id: loan.user_id,
                loan_id: Some(loan.id),
                kind: TxKind::InterestPayment,
                asset: loan.borrow_type,
                amount: interest,
                value_usd: Some(prices.to_usd(loan.borrow_type, interest)),
                tx_hash: None,
                status: TxStatus::Confirmed,
            },
        )
        .await?;
        tx.commit().await?;

        events.push(Event::ltv_update(
            loan.id,
            loan.user_id,
            loan.current_ltv,
            loan.status,
        ));
        self.bus.publish_all(&events);
        Ok(Some(loan))
    }

    /// Recomputes every open loan's LTV at fresh prices and applies the
    /// status machine:
    /// - at or past the liquidation band the status is left for the risk
    ///   loop to sweep, never auto-repaired;
    /// - entering the margin band logs and alerts once per crossing;
    /// - dropping back below the band restores the loan to active.
    pub async fn update_all_ltvs(&self) -> Result<(), LendingError> {
        let prices = self.oracle.snapshot().await;

        let mut tx = self.ledger.begin().await?;
        let loans = storage::open_loans(&mut *tx).await?;
        let mut events = Vec::with_capacity(loans.len());
        for mut loan in loans {
            let previous_status = loan.status;
            loan.current_ltv = loan_ltv(&loan, &prices);
            if loan.current_ltv >= self.params.liquidation_ltv {
                // Leave the status; the liquidation scan owns this band.
            } else if loan.current_ltv >= self.params.margin_call_ltv {
                if previous_status == LoanStatus::Active {
                    let current_ltv = loan.current_ltv;
                    trigger_margin_call(&mut *tx, &mut loan, current_ltv, &mut events).await?;
                }
            } else if previous_status == LoanStatus::MarginCall {
                loan.status = LoanStatus::Active;
            }
            loan.updated_at = Utc::now();
            storage::update_loan(&mut *tx, &loan).await?;
            events.push(Event::ltv_update(
                loan.id,
                loan.user_id,
                loan.current_ltv,
                loan.status,
            ));
        }
        tx.commit().await?;

        self.bus.publish_all(&events);
        Ok(())
    }
}
