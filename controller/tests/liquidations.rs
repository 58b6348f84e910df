mod setup;

use common_structs::{Asset, LoanStatus, TxKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use setup::LendingTestState;

/// Price-driven margin call right at the band boundary: 74.6% stays active,
/// 75.0% enters margin call with one log entry and one alert frame.
#[tokio::test]
async fn price_drop_margin_call_boundary() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    let mut rx = state.state.bus.subscribe(user.id);

    state.set_xec_price(dec!(0.0000201)).await;
    state
        .state
        .engine
        .update_all_ltvs()
        .await
        .expect("ltv sweep");
    let loan_after = state.loan(loan.id).await;
    assert!(loan_after.current_ltv < dec!(75));
    assert!(loan_after.current_ltv > dec!(74));
    assert_eq!(loan_after.status, LoanStatus::Active);
    assert!(state.margin_calls(loan.id).await.is_empty());

    state.set_xec_price(dec!(0.0000200)).await;
    state
        .state
        .engine
        .update_all_ltvs()
        .await
        .expect("ltv sweep");
    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.current_ltv, dec!(75));
    assert_eq!(loan_after.status, LoanStatus::MarginCall);

    let calls = state.margin_calls(loan.id).await;
    assert_eq!(calls.len(), 1);

    let frames = LendingTestState::drain_frames(&mut rx);
    let alerts: Vec<_> = frames
        .iter()
        .filter(|frame| frame["type"] == "loan:margin-call")
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["data"]["ltv"], 75.0);

    // A second sweep in the band does not log another crossing.
    state
        .state
        .engine
        .update_all_ltvs()
        .await
        .expect("ltv sweep");
    assert_eq!(state.margin_calls(loan.id).await.len(), 1);
}

/// The worked liquidation: debt 15 USD, 2% fee, 850k of 1M XEC sold at
/// 0.000018, 150k returned, loan terminal.
#[tokio::test]
async fn liquidation_recovers_debt_plus_fee() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    state.set_xec_price(dec!(0.0000180)).await;
    let liquidated = state
        .state
        .risk
        .scan_and_liquidate()
        .await
        .expect("risk scan");
    assert_eq!(liquidated.len(), 1);
    let summary = &liquidated[0];
    assert_eq!(summary.loan_id, loan.id);
    assert_eq!(summary.debt_covered_usd, dec!(15));
    assert_eq!(summary.fee_usd, dec!(0.30));
    assert_eq!(summary.sold, dec!(850_000));
    assert_eq!(summary.returned, dec!(150_000));

    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.status, LoanStatus::Liquidated);
    assert_eq!(loan_after.collateral_amount, Decimal::ZERO);
    assert_eq!(loan_after.borrow_amount, Decimal::ZERO);
    assert_eq!(loan_after.accrued_interest, Decimal::ZERO);
    assert!(loan_after.closed_at.is_some());

    let user_after = state.user(user.id).await;
    assert_eq!(user_after.xec_balance, dec!(150_000));

    let entries: Vec<_> = state
        .transactions(user.id)
        .await
        .into_iter()
        .filter(|tx| tx.kind == TxKind::Liquidation)
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].asset, Asset::Xec);
    assert_eq!(entries[0].amount, dec!(850_000));
    assert_eq!(entries[0].value_usd, Some(dec!(15.30)));

    // The collateral left the staking pool with the loan.
    let pool = state.staking_pool().await;
    assert_eq!(pool.user_contributed, Decimal::ZERO);
}

/// A loan sitting exactly on the liquidation threshold is swept.
#[tokio::test]
async fn liquidates_exactly_at_threshold() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(16.6)).await;

    // Collateral value 20 USD, debt 16.6 USD: LTV exactly 83%.
    state.set_xec_price(dec!(0.0000200)).await;
    let liquidated = state
        .state
        .risk
        .scan_and_liquidate()
        .await
        .expect("risk scan");
    assert_eq!(liquidated.len(), 1);
    assert_eq!(state.loan(loan.id).await.status, LoanStatus::Liquidated);
}

/// When the collateral cannot cover debt plus fee, everything is sold, the
/// owner gets nothing back and the shortfall is absorbed.
#[tokio::test]
async fn partially_underwater_loan_sells_everything() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    // Collateral worth 10 USD against 15 USD of debt: fully underwater.
    state.set_xec_price(dec!(0.0000100)).await;
    let liquidated = state
        .state
        .risk
        .scan_and_liquidate()
        .await
        .expect("risk scan");
    assert_eq!(liquidated.len(), 1);
    let summary = &liquidated[0];
    assert_eq!(summary.sold, dec!(1_000_000));
    assert_eq!(summary.returned, Decimal::ZERO);

    let loan_after = state.loan(loan.id).await;
    assert_eq!(loan_after.status, LoanStatus::Liquidated);
    assert_eq!(state.user(user.id).await.xec_balance, Decimal::ZERO);
}

/// A zero collateral price reads as LTV 100 and liquidates on the next
/// scan.
#[tokio::test]
async fn zero_price_liquidates_immediately() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    state.set_xec_price(Decimal::ZERO).await;
    let ltv = state
        .state
        .engine
        .calculate_ltv(Asset::Firma, dec!(15), Decimal::ZERO, Asset::Xec, dec!(1_000_000))
        .await;
    assert_eq!(ltv, dec!(100));

    let liquidated = state
        .state
        .risk
        .scan_and_liquidate()
        .await
        .expect("risk scan");
    assert_eq!(liquidated.len(), 1);
    assert_eq!(liquidated[0].sold, dec!(1_000_000));
    assert_eq!(state.loan(loan.id).await.status, LoanStatus::Liquidated);
}

/// Loans at risk are ordered most-underwater first.
#[tokio::test]
async fn loans_at_risk_orders_by_ltv_descending() {
    let state = LendingTestState::new().await;
    let safer = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let riskier = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let safer_loan = state.open_loan(safer.id, dec!(1_000_000), dec!(15.2)).await;
    let riskier_loan = state.open_loan(riskier.id, dec!(1_000_000), dec!(16)).await;

    // Collateral value 20 USD: LTVs 76% and 80%.
    state.set_xec_price(dec!(0.0000200)).await;
    state
        .state
        .engine
        .update_all_ltvs()
        .await
        .expect("ltv sweep");

    let at_risk = state.state.risk.loans_at_risk().await.expect("at risk");
    assert_eq!(at_risk.len(), 2);
    assert_eq!(at_risk[0].id, riskier_loan.id);
    assert_eq!(at_risk[0].current_ltv, dec!(80));
    assert_eq!(at_risk[1].id, safer_loan.id);
    assert_eq!(at_risk[1].current_ltv, dec!(76));
}
