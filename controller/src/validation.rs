//! Request-level guards shared by the API surface and the core operations.
//! Everything here rejects before any ledger transaction is opened.

use common_errors::{
    LendingError, ERROR_ADDRESS_EMPTY, ERROR_AMOUNT_NOT_POSITIVE, ERROR_ASSET_NOT_BORROWABLE,
    ERROR_ASSET_NOT_SUPPORTED,
};
use common_structs::Asset;
use rust_decimal::Decimal;

pub fn require_positive(amount: Decimal) -> Result<(), LendingError> {
    if amount <= Decimal::ZERO {
        return Err(LendingError::Validation(ERROR_AMOUNT_NOT_POSITIVE.to_owned()));
    }
    Ok(())
}

pub fn require_address(address: &str) -> Result<(), LendingError> {
    if address.trim().is_empty() {
        return Err(LendingError::Validation(ERROR_ADDRESS_EMPTY.to_owned()));
    }
    Ok(())
}

pub fn require_collateral_asset(asset: Asset) -> Result<(), LendingError> {
    if !Asset::COLLATERAL.contains(&asset) {
        return Err(LendingError::Validation(ERROR_ASSET_NOT_SUPPORTED.to_owned()));
    }
    Ok(())
}

pub fn require_borrowable_asset(asset: Asset) -> Result<(), LendingError> {
    if !Asset::BORROWABLE.contains(&asset) {
        return Err(LendingError::Validation(ERROR_ASSET_NOT_BORROWABLE.to_owned()));
    }
    Ok(())
}

/// Parses an asset string from a request payload.
pub fn parse_asset(raw: &str) -> Result<Asset, LendingError> {
    Asset::parse(raw).ok_or_else(|| LendingError::Validation(ERROR_ASSET_NOT_SUPPORTED.to_owned()))
}
