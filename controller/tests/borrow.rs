mod setup;

use common_errors::LendingError;
use common_structs::{Asset, LoanStatus, TxKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use setup::LendingTestState;

/// Max borrow follows `collateral × price × initial_ltv / borrow_price`.
#[tokio::test]
async fn max_borrow_respects_initial_ltv() {
    let state = LendingTestState::new().await;

    let max = state
        .state
        .engine
        .calculate_max_borrow(Asset::Xec, dec!(1_000_000), Asset::Firma)
        .await;
    assert_eq!(max, dec!(19.5));
}

/// A borrow asset without a price yields a zero borrowing capacity.
#[tokio::test]
async fn max_borrow_is_zero_when_borrow_asset_has_no_price() {
    let state = LendingTestState::new().await;
    state.set_xec_price(Decimal::ZERO).await;

    let max = state
        .state
        .engine
        .calculate_max_borrow(Asset::Firma, dec!(100), Asset::Xec)
        .await;
    assert_eq!(max, Decimal::ZERO);
}

/// Opening a loan moves the collateral out of the balance, credits the
/// borrowed asset and records the borrow.
#[tokio::test]
async fn create_loan_happy_path() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;

    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.current_ltv, dec!(50));
    assert_eq!(loan.initial_ltv, loan.current_ltv);
    assert_eq!(loan.collateral_amount, dec!(1_000_000));
    assert_eq!(loan.borrow_amount, dec!(15));
    assert_eq!(loan.accrued_interest, Decimal::ZERO);

    let user = state.user(user.id).await;
    assert_eq!(user.xec_balance, Decimal::ZERO);
    assert_eq!(user.firma_balance, dec!(15));

    let borrow_entries: Vec<_> = state
        .transactions(user.id)
        .await
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Borrow)
        .collect();
    assert_eq!(borrow_entries.len(), 1);
    assert_eq!(borrow_entries[0].amount, dec!(15));
    assert_eq!(borrow_entries[0].loan_id, Some(loan.id));

    // XEC collateral joins the staking pool.
    let pool = state.staking_pool().await;
    assert_eq!(pool.user_contributed, dec!(1_000_000));
    assert_eq!(pool.total, pool.platform_base + pool.user_contributed);
}

/// Creation exactly at the initial LTV cap succeeds; one tick above fails.
#[tokio::test]
async fn create_loan_at_cap_boundary() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;

    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(19.5)).await;
    assert_eq!(loan.current_ltv, dec!(65));

    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let err = state
        .state
        .engine
        .create_loan(user.id, Asset::Xec, dec!(1_000_000), Asset::Firma, dec!(19.51))
        .await
        .expect_err("above the cap");
    assert!(matches!(err, LendingError::LtvExceeded { .. }));
}

#[tokio::test]
async fn create_loan_requires_collateral_balance() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(500_000), Decimal::ZERO).await;

    let err = state
        .state
        .engine
        .create_loan(user.id, Asset::Xec, dec!(1_000_000), Asset::Firma, dec!(10))
        .await
        .expect_err("not enough collateral");
    assert!(matches!(err, LendingError::InsufficientBalance { .. }));
}

#[tokio::test]
async fn create_loan_rejects_non_positive_amounts() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;

    let err = state
        .state
        .engine
        .create_loan(user.id, Asset::Xec, Decimal::ZERO, Asset::Firma, dec!(1))
        .await
        .expect_err("zero collateral");
    assert!(matches!(err, LendingError::Validation(_)));
}

/// FIRMA collateral backing an XEC borrow works the same way but does not
/// touch the staking pool.
#[tokio::test]
async fn firma_collateral_stays_out_of_staking_pool() {
    let state = LendingTestState::new().await;
    let user = state.create_user(Decimal::ZERO, dec!(100)).await;

    let loan = state
        .state
        .engine
        .create_loan(user.id, Asset::Firma, dec!(30), Asset::Xec, dec!(500_000))
        .await
        .expect("firma-backed loan");
    // 500_000 XEC at 0.00003 = 15 USD against 30 USD collateral.
    assert_eq!(loan.current_ltv, dec!(50));

    let pool = state.staking_pool().await;
    assert_eq!(pool.user_contributed, Decimal::ZERO);
}
