mod setup;

use common_errors::LendingError;
use common_structs::{LoanStatus, TxKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use setup::LendingTestState;

/// After 100 hours of accrual, a partial repayment clears interest before it
/// touches the principal.
#[tokio::test]
async fn partial_repay_is_interest_first() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    state.backdate_interest(loan.id, 100).await;
    state
        .state
        .engine
        .accrue_interest(loan.id)
        .await
        .expect("accrue");
    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.accrued_interest, dec!(0.15));

    let outcome = state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(0.10))
        .await
        .expect("partial repay");
    assert!(!outcome.fully_repaid);
    assert_eq!(outcome.remaining_debt, dec!(15.05));

    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.accrued_interest, dec!(0.05));
    assert_eq!(loan_after.borrow_amount, dec!(15));
    assert_eq!(loan_after.status, LoanStatus::Active);
}

/// A surplus over the accrued interest reduces the principal.
#[tokio::test]
async fn partial_repay_surplus_reduces_principal() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    state.backdate_interest(loan.id, 100).await;
    state
        .state
        .engine
        .accrue_interest(loan.id)
        .await
        .expect("accrue");

    let outcome = state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(1.15))
        .await
        .expect("repay");
    assert!(!outcome.fully_repaid);

    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.accrued_interest, Decimal::ZERO);
    assert_eq!(loan_after.borrow_amount, dec!(14));
}

/// Full repayment returns the collateral, closes the loan and zeroes its
/// monetary fields.
#[tokio::test]
async fn full_repay_returns_collateral_and_closes() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    let outcome = state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(15))
        .await
        .expect("full repay");
    assert!(outcome.fully_repaid);
    assert_eq!(outcome.remaining_debt, Decimal::ZERO);

    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.status, LoanStatus::Repaid);
    assert_eq!(loan_after.collateral_amount, Decimal::ZERO);
    assert_eq!(loan_after.borrow_amount, Decimal::ZERO);
    assert_eq!(loan_after.accrued_interest, Decimal::ZERO);
    assert!(loan_after.closed_at.is_some());

    // Round trip: the user holds the original totals again.
    let user_after = state.user(user.id).await;
    assert_eq!(user_after.xec_balance, dec!(1_000_000));
    assert_eq!(user_after.firma_balance, Decimal::ZERO);

    // The XEC collateral left the staking pool with the loan.
    let pool = state.staking_pool().await;
    assert_eq!(pool.user_contributed, Decimal::ZERO);
    assert_eq!(pool.total, pool.platform_base);
}

/// Overpaying only ever takes the outstanding debt.
#[tokio::test]
async fn overpay_is_clamped_to_debt() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), dec!(100)).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    let outcome = state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(999))
        .await
        .expect("overpay");
    assert!(outcome.fully_repaid);

    let user_after = state.user(user.id).await;
    // Funded 100 + borrowed 15 - repaid 15.
    assert_eq!(user_after.firma_balance, dec!(100));
}

#[tokio::test]
async fn repay_rejects_foreign_and_closed_loans() {
    let state = LendingTestState::new().await;
    let owner = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let other = state.create_user(Decimal::ZERO, dec!(50)).await;
    let loan = state.open_loan(owner.id, dec!(1_000_000), dec!(15)).await;

    let err = state
        .state
        .engine
        .repay_loan(loan.id, other.id, dec!(1))
        .await
        .expect_err("not the owner");
    assert!(matches!(err, LendingError::Unauthorised));

    state
        .state
        .engine
        .repay_loan(loan.id, owner.id, dec!(15))
        .await
        .expect("close");
    let err = state
        .state
        .engine
        .repay_loan(loan.id, owner.id, dec!(1))
        .await
        .expect_err("already closed");
    assert!(matches!(err, LendingError::TerminalLoan));
}

/// Balances reconcile against the transaction log for every balance-moving
/// kind.
#[tokio::test]
async fn balances_match_transaction_log() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), dec!(20)).await;
    let loan = state.open_loan(user.id, dec!(600_000), dec!(10)).await;
    state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(4))
        .await
        .expect("partial repay");
    state
        .state
        .engine
        .add_collateral(loan.id, user.id, dec!(100_000))
        .await
        .expect("top up");

    let user_after = state.user(user.id).await;
    let mut xec = Decimal::ZERO;
    let mut firma = Decimal::ZERO;
    for tx in state.transactions(user.id).await {
        let signed = match tx.kind {
            TxKind::DepositXec | TxKind::DepositFirma | TxKind::FirmaSwap | TxKind::Borrow => {
                tx.amount
            }
            TxKind::Repay | TxKind::WithdrawXec | TxKind::WithdrawFirma => -tx.amount,
            // Collateral move-ins become loan collateral rather than
            // balance, and interest, rewards and liquidations do not move
            // wallet balances directly.
            _ => Decimal::ZERO,
        };
        match tx.asset {
            common_structs::Asset::Xec => xec += signed,
            common_structs::Asset::Firma => firma += signed,
            common_structs::Asset::Xecx => {}
        }
    }
    // What is not in the balance sits as collateral inside the open loan.
    let loan_after = state.loan(loan.id).await;
    assert_eq!(user_after.xec_balance, xec - loan_after.collateral_amount);
    assert_eq!(user_after.firma_balance, firma);
}
