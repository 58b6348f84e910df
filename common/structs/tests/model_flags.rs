use chrono::Utc;
use common_structs::{Asset, Loan, LoanStatus, TxKind, WalletKind};
use rust_decimal::Decimal;

fn sample_loan(status: LoanStatus) -> Loan {
    let now = Utc::now();
    Loan {
        id: 1,
        user_id: 1,
        status,
        collateral_type: Asset::Xec,
        collateral_amount: Decimal::from(1_000_000),
        collateral_value_usd: Decimal::from(30),
        borrow_type: Asset::Firma,
        borrow_amount: Decimal::from(15),
        borrow_value_usd: Decimal::from(15),
        interest_rate: Decimal::new(1, 4),
        accrued_interest: Decimal::new(5, 1),
        initial_ltv: Decimal::from(50),
        current_ltv: Decimal::from(50),
        staking_yield_earned: Decimal::ZERO,
        created_at: now,
        updated_at: now,
        last_interest_update: now,
        closed_at: None,
    }
}

#[test]
fn asset_parsing_and_column_mapping() {
    assert_eq!(Asset::parse("xec"), Some(Asset::Xec));
    assert_eq!(Asset::parse("FIRMA"), Some(Asset::Firma));
    assert_eq!(Asset::parse("XecX"), Some(Asset::Xecx));
    assert_eq!(Asset::parse("DOGE"), None);

    assert_eq!(Asset::Xec.balance_column(), "xec_balance");
    assert_eq!(Asset::Firma.balance_column(), "firma_balance");
    assert_eq!(Asset::Xecx.balance_column(), "xecx_balance");

    assert_eq!(WalletKind::parse("ecash"), Some(WalletKind::Ecash));
    assert_eq!(WalletKind::parse("SOLANA"), Some(WalletKind::Solana));
    assert_eq!(WalletKind::Ecash.address_column(), "ecash_address");
}

#[test]
fn loan_status_terminality() {
    assert!(!LoanStatus::Active.is_terminal());
    assert!(!LoanStatus::MarginCall.is_terminal());
    assert!(LoanStatus::Repaid.is_terminal());
    assert!(LoanStatus::Liquidated.is_terminal());
}

#[test]
fn loan_debt_and_staking_flags() {
    let loan = sample_loan(LoanStatus::Active);
    assert_eq!(loan.total_debt(), Decimal::from(15) + Decimal::new(5, 1));
    assert!(loan.is_staking_backed());

    let closed = sample_loan(LoanStatus::Liquidated);
    assert!(!closed.is_staking_backed());
}

#[test]
fn tx_kind_wire_names() {
    assert_eq!(TxKind::DepositXec.as_str(), "deposit_xec");
    assert_eq!(TxKind::AddCollateral.as_str(), "add_collateral");
    assert_eq!(TxKind::FirmaSwap.as_str(), "firma_swap");
    assert!(TxKind::FirmaSwap.is_deposit());
    assert!(!TxKind::Borrow.is_deposit());
}
