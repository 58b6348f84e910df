use rust_decimal::Decimal;
use thiserror::Error;

/// Error surface of the lending core.
///
/// Display texts are the messages served to clients; the HTTP status mapping
/// lives at the router boundary.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found.")]
    NotFound(&'static str),

    #[error("Loan does not belong to the caller.")]
    Unauthorised,

    #[error("Not enough {asset} balance available for this operation.")]
    InsufficientBalance { asset: &'static str },

    #[error("Loan-to-value {ltv}% is above the maximum allowed {max}%.")]
    LtvExceeded { ltv: Decimal, max: Decimal },

    #[error("Loan is already closed.")]
    TerminalLoan,

    #[error("Price feed unavailable: {0}")]
    PriceFeed(String),

    #[error("Indexer unavailable: {0}")]
    Indexer(String),

    #[error("Ledger transaction failed: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

impl LendingError {
    /// Write conflicts are retried once by callers before being surfaced.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Ledger(sqlx::Error::Database(db)) => {
                let msg = db.message();
                msg.contains("database is locked") || msg.contains("database table is locked")
            }
            _ => false,
        }
    }
}

pub static ERROR_AMOUNT_NOT_POSITIVE: &str = "Amount must be greater than zero.";

pub static ERROR_ADDRESS_EMPTY: &str = "Address must not be empty.";

pub static ERROR_ASSET_NOT_SUPPORTED: &str = "Asset not supported.";

pub static ERROR_ASSET_NOT_BORROWABLE: &str = "Asset not borrowable against this collateral.";

pub static ERROR_WALLET_TYPE_UNKNOWN: &str = "Unknown wallet type.";

pub static ERROR_ADDRESS_TAKEN: &str = "Address is already linked to another account.";
