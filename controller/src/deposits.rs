//! Balance-moving operations observed from the outside world: confirmed
//! chain deposits, the 1:1 USD→FIRMA bridge credit, and withdrawal requests
//! handed off to the external broadcaster. The core never touches keys or
//! broadcasts transactions itself.

use common_errors::{LendingError, ERROR_ASSET_NOT_SUPPORTED};
use common_events::Event;
use common_structs::{Asset, TxKind, TxRecord, TxStatus};
use rust_decimal::Decimal;

use crate::oracle::PriceSnapshot;
use crate::storage::{self, Ledger, NewTx};
use crate::validation;
use crate::ws::NotificationBus;

/// Credits a confirmed on-chain deposit to the user's balance.
pub async fn credit_deposit(
    ledger: &Ledger,
    bus: &NotificationBus,
    prices: &PriceSnapshot,
    user_id: i64,
    asset: Asset,
    amount: Decimal,
    tx_hash: Option<String>,
) -> Result<TxRecord, LendingError> {
    validation::require_positive(amount)?;
    let kind = match asset {
        Asset::Xec => TxKind::DepositXec,
        Asset::Firma => TxKind::DepositFirma,
        Asset::Xecx => {
            return Err(LendingError::Validation(ERROR_ASSET_NOT_SUPPORTED.to_owned()))
        }
    };

    let mut tx = ledger.begin().await?;
    let balance = storage::credit_balance(&mut *tx, user_id, asset, amount).await?;
    let record = storage::insert_tx(
        &mut *tx,
        NewTx {
            user_id,
            loan_id: None,
            kind,
            asset,
            amount,
            value_usd: Some(prices.to_usd(asset, amount)),
            tx_hash,
            status: TxStatus::Confirmed,
        },
    )
    .await?;
    tx.commit().await?;

    bus.publish(&Event::balance_update(user_id, asset, balance));
    Ok(record)
}

/// 1:1 USD→FIRMA bridge credit for an observed stablecoin deposit on the
/// second chain.
pub async fn bridge_usdt_deposit(
    ledger: &Ledger,
    bus: &NotificationBus,
    user_id: i64,
    amount: Decimal,
    signature: Option<String>,
) -> Result<TxRecord, LendingError> {
    validation::require_positive(amount)?;

    let mut tx = ledger.begin().await?;
    let balance = storage::credit_balance(&mut *tx, user_id, Asset::Firma, amount).await?;
    let record = storage::insert_tx(
        &mut *tx,
        NewTx {
            user_id,
            loan_id: None,
            kind: TxKind::FirmaSwap,
            asset: Asset::Firma,
            amount,
            // Pegged 1:1, so the USD value is the amount itself.
            value_usd: Some(amount),
            tx_hash: signature,
            status: TxStatus::Confirmed,
        },
    )
    .await?;
    tx.commit().await?;

    bus.publish(&Event::balance_update(user_id, Asset::Firma, balance));
    Ok(record)
}

/// Debits a withdrawal and parks it as `pending` for the external
/// broadcaster to settle.
pub async fn request_withdrawal(
    ledger: &Ledger,
    bus: &NotificationBus,
    prices: &PriceSnapshot,
    user_id: i64,
    asset: Asset,
    amount: Decimal,
) -> Result<TxRecord, LendingError> {
    validation::require_positive(amount)?;
    let kind = match asset {
        Asset::Xec => TxKind::WithdrawXec,
        Asset::Firma => TxKind::WithdrawFirma,
        Asset::Xecx => {
            return Err(LendingError::Validation(ERROR_ASSET_NOT_SUPPORTED.to_owned()))
        }
    };

    let mut tx = ledger.begin().await?;
    let balance = storage::debit_balance(&mut *tx, user_id, asset, amount).await?;
    let record = storage::insert_tx(
        &mut *tx,
        NewTx {
            user_id,
            loan_id: None,
            kind,
            asset,
            amount,
            value_usd: Some(prices.to_usd(asset, amount)),
            tx_hash: None,
            status: TxStatus::Pending,
        },
    )
    .await?;
    tx.commit().await?;

    bus.publish(&Event::balance_update(user_id, asset, balance));
    Ok(record)
}
