//! Durable, transactional persistence for users, loans, transactions, escrow
//! wallets, the staking pool, the margin-call log and the price cache.
//!
//! The pool is capped at a single connection, so every unit of work obtained
//! through [`Ledger::begin`] is serialised by construction. Row helpers are
//! free functions over `&mut SqliteConnection` and compose inside one
//! transaction; monetary columns are canonical decimal text and all
//! arithmetic happens in [`Decimal`] before the row is written back.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use common_errors::LendingError;
use common_structs::{
    AlertType, Asset, EscrowWallet, Loan, MarginCallEntry, PricePoint, PriceSource, StakingPool,
    TxKind, TxRecord, TxStatus, User, WalletKind,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ecash_address TEXT UNIQUE,
        solana_address TEXT UNIQUE,
        xec_balance TEXT NOT NULL DEFAULT '0',
        firma_balance TEXT NOT NULL DEFAULT '0',
        xecx_balance TEXT NOT NULL DEFAULT '0',
        staking_rewards_earned TEXT NOT NULL DEFAULT '0',
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS loans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        status TEXT NOT NULL,
        collateral_type TEXT NOT NULL,
        collateral_amount TEXT NOT NULL,
        collateral_value_usd TEXT NOT NULL,
        borrow_type TEXT NOT NULL,
        borrow_amount TEXT NOT NULL,
        borrow_value_usd TEXT NOT NULL,
        interest_rate TEXT NOT NULL,
        accrued_interest TEXT NOT NULL DEFAULT '0',
        initial_ltv TEXT NOT NULL,
        current_ltv TEXT NOT NULL,
        staking_yield_earned TEXT NOT NULL DEFAULT '0',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_interest_update TEXT NOT NULL,
        closed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_loans_user ON loans(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_loans_status ON loans(status)",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        loan_id INTEGER REFERENCES loans(id),
        kind TEXT NOT NULL,
        asset TEXT NOT NULL,
        amount TEXT NOT NULL,
        value_usd TEXT,
        tx_hash TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_kind ON transactions(kind)",
    "CREATE TABLE IF NOT EXISTS staking_pool (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        platform_base TEXT NOT NULL,
        user_contributed TEXT NOT NULL,
        total TEXT NOT NULL,
        last_reward_distribution TEXT,
        total_rewards_distributed TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS escrow_wallets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chain TEXT NOT NULL,
        address TEXT NOT NULL,
        asset TEXT NOT NULL,
        balance TEXT NOT NULL DEFAULT '0',
        updated_at TEXT NOT NULL,
        UNIQUE(address, asset)
    )",
    "CREATE TABLE IF NOT EXISTS margin_calls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        loan_id INTEGER NOT NULL REFERENCES loans(id),
        user_id INTEGER NOT NULL REFERENCES users(id),
        ltv TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS prices (
        asset TEXT PRIMARY KEY,
        price_usd TEXT NOT NULL,
        source TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Handle to the durable ledger. Cheap to clone; all clones share the single
/// write connection.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub async fn connect(path: &str) -> Result<Self, LendingError> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        Self::with_options(options).await
    }

    /// Private in-memory ledger, used by the integration tests.
    pub async fn in_memory() -> Result<Self, LendingError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(LendingError::Ledger)?
            .foreign_keys(true);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self, LendingError> {
        // One connection: the ledger is the single arbiter of write ordering.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begins a writer-exclusive unit of work. Dropping the transaction
    /// without committing rolls the whole unit back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, LendingError> {
        Ok(self.pool.begin().await?)
    }

    /// Creates the schema and seeds the staking pool and default prices.
    /// Idempotent; runs on every startup.
    pub async fn bootstrap(&self) -> Result<(), LendingError> {
        let mut tx = self.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT OR IGNORE INTO staking_pool
             (id, platform_base, user_contributed, total, last_reward_distribution, total_rewards_distributed)
             VALUES (1, ?, '0', ?, NULL, '0')",
        )
        .bind(common_constants::STAKING_PLATFORM_BASE.to_string())
        .bind(common_constants::STAKING_PLATFORM_BASE.to_string())
        .execute(&mut *tx)
        .await?;
        let now = Utc::now();
        for (asset, price, source) in [
            (Asset::Xec, common_constants::DEFAULT_XEC_PRICE, PriceSource::Default),
            (Asset::Xecx, common_constants::DEFAULT_XEC_PRICE, PriceSource::Default),
            (Asset::Firma, common_constants::FIRMA_PEG_PRICE, PriceSource::Pegged),
        ] {
            sqlx::query(
                "INSERT OR IGNORE INTO prices (asset, price_usd, source, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(asset)
            .bind(price.to_string())
            .bind(source)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Retries a ledger operation once on a write conflict, per the error
/// handling contract, then surfaces the failure.
pub async fn retry_once<T, Fut, F>(op: F) -> Result<T, LendingError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, LendingError>>,
{
    match op().await {
        Err(err) if err.is_conflict() => op().await,
        other => other,
    }
}

fn dec_col(row: &SqliteRow, column: &str) -> Result<Decimal, LendingError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|err| LendingError::CorruptRow(format!("column {column}: {err}")))
}

fn opt_dec_col(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, LendingError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Decimal::from_str(&value)
            .map_err(|err| LendingError::CorruptRow(format!("column {column}: {err}")))
    })
    .transpose()
}

fn map_user(row: &SqliteRow) -> Result<User, LendingError> {
    Ok(User {
        id: row.try_get("id")?,
        ecash_address: row.try_get("ecash_address")?,
        solana_address: row.try_get("solana_address")?,
        xec_balance: dec_col(row, "xec_balance")?,
        firma_balance: dec_col(row, "firma_balance")?,
        xecx_balance: dec_col(row, "xecx_balance")?,
        staking_rewards_earned: dec_col(row, "staking_rewards_earned")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_loan(row: &SqliteRow) -> Result<Loan, LendingError> {
    Ok(Loan {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        status: row.try_get("status")?,
        collateral_type: row.try_get("collateral_type")?,
        collateral_amount: dec_col(row, "collateral_amount")?,
        collateral_value_usd: dec_col(row, "collateral_value_usd")?,
        borrow_type: row.try_get("borrow_type")?,
        borrow_amount: dec_col(row, "borrow_amount")?,
        borrow_value_usd: dec_col(row, "borrow_value_usd")?,
        interest_rate: dec_col(row, "interest_rate")?,
        accrued_interest: dec_col(row, "accrued_interest")?,
        initial_ltv: dec_col(row, "initial_ltv")?,
        current_ltv: dec_col(row, "current_ltv")?,
        staking_yield_earned: dec_col(row, "staking_yield_earned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_interest_update: row.try_get("last_interest_update")?,
        closed_at: row.try_get("closed_at")?,
    })
}

fn map_tx(row: &SqliteRow) -> Result<TxRecord, LendingError> {
    Ok(TxRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        loan_id: row.try_get("loan_id")?,
        kind: row.try_get("kind")?,
        asset: row.try_get("asset")?,
        amount: dec_col(row, "amount")?,
        value_usd: opt_dec_col(row, "value_usd")?,
        tx_hash: row.try_get("tx_hash")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_pool(row: &SqliteRow) -> Result<StakingPool, LendingError> {
    Ok(StakingPool {
        platform_base: dec_col(row, "platform_base")?,
        user_contributed: dec_col(row, "user_contributed")?,
        total: dec_col(row, "total")?,
        last_reward_distribution: row.try_get("last_reward_distribution")?,
        total_rewards_distributed: dec_col(row, "total_rewards_distributed")?,
    })
}

fn map_escrow(row: &SqliteRow) -> Result<EscrowWallet, LendingError> {
    Ok(EscrowWallet {
        id: row.try_get("id")?,
        chain: row.try_get("chain")?,
        address: row.try_get("address")?,
        asset: row.try_get("asset")?,
        balance: dec_col(row, "balance")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_margin_call(row: &SqliteRow) -> Result<MarginCallEntry, LendingError> {
    Ok(MarginCallEntry {
        id: row.try_get("id")?,
        loan_id: row.try_get("loan_id")?,
        user_id: row.try_get("user_id")?,
        ltv: dec_col(row, "ltv")?,
        alert_type: row.try_get("alert_type")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_price(row: &SqliteRow) -> Result<PricePoint, LendingError> {
    Ok(PricePoint {
        asset: row.try_get("asset")?,
        price_usd: dec_col(row, "price_usd")?,
        source: row.try_get("source")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// --- users ---

pub async fn insert_user(
    conn: &mut SqliteConnection,
    wallet: WalletKind,
    address: &str,
) -> Result<User, LendingError> {
    let now = Utc::now();
    let sql = match wallet {
        WalletKind::Ecash => "INSERT INTO users (ecash_address, created_at) VALUES (?, ?)",
        WalletKind::Solana => "INSERT INTO users (solana_address, created_at) VALUES (?, ?)",
    };
    let result = sqlx::query(sql).bind(address).bind(now).execute(&mut *conn).await?;
    let id = result.last_insert_rowid();
    user_by_id(conn, id)
        .await?
        .ok_or(LendingError::NotFound("User"))
}

pub async fn user_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<User>, LendingError> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_user).transpose()
}

pub async fn user_by_address(
    conn: &mut SqliteConnection,
    wallet: WalletKind,
    address: &str,
) -> Result<Option<User>, LendingError> {
    let sql = match wallet {
        WalletKind::Ecash => "SELECT * FROM users WHERE ecash_address = ?",
        WalletKind::Solana => "SELECT * FROM users WHERE solana_address = ?",
    };
    let row = sqlx::query(sql)
        .bind(address)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_user).transpose()
}

/// Attaches a chain address to an existing user. The address must not be in
/// use by any other account.
pub async fn link_address(
    conn: &mut SqliteConnection,
    user_id: i64,
    wallet: WalletKind,
    address: &str,
) -> Result<User, LendingError> {
    if let Some(existing) = user_by_address(conn, wallet, address).await? {
        if existing.id != user_id {
            return Err(LendingError::Validation(
                common_errors::ERROR_ADDRESS_TAKEN.to_owned(),
            ));
        }
    }
    let sql = match wallet {
        WalletKind::Ecash => "UPDATE users SET ecash_address = ? WHERE id = ?",
        WalletKind::Solana => "UPDATE users SET solana_address = ? WHERE id = ?",
    };
    sqlx::query(sql)
        .bind(address)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    user_by_id(conn, user_id)
        .await?
        .ok_or(LendingError::NotFound("User"))
}

async fn write_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    asset: Asset,
    new_balance: Decimal,
) -> Result<(), LendingError> {
    // Column resolved from the closed enum, never from input.
    let sql = match asset {
        Asset::Xec => "UPDATE users SET xec_balance = ? WHERE id = ?",
        Asset::Firma => "UPDATE users SET firma_balance = ? WHERE id = ?",
        Asset::Xecx => "UPDATE users SET xecx_balance = ? WHERE id = ?",
    };
    sqlx::query(sql)
        .bind(new_balance.to_string())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Adds to a user balance and returns the new balance.
pub async fn credit_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    asset: Asset,
    amount: Decimal,
) -> Result<Decimal, LendingError> {
    let user = user_by_id(conn, user_id)
        .await?
        .ok_or(LendingError::NotFound("User"))?;
    let new_balance = user.balance(asset) + amount;
    write_balance(conn, user_id, asset, new_balance).await?;
    Ok(new_balance)
}

/// Removes from a user balance; balances never go negative.
pub async fn debit_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    asset: Asset,
    amount: Decimal,
) -> Result<Decimal, LendingError> {
    let user = user_by_id(conn, user_id)
        .await?
        .ok_or(LendingError::NotFound("User"))?;
    let current = user.balance(asset);
    if current < amount {
        return Err(LendingError::InsufficientBalance {
            asset: asset.as_str(),
        });
    }
    let new_balance = current - amount;
    write_balance(conn, user_id, asset, new_balance).await?;
    Ok(new_balance)
}

pub async fn add_staking_rewards(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
) -> Result<Decimal, LendingError> {
    let user = user_by_id(conn, user_id)
        .await?
        .ok_or(LendingError::NotFound("User"))?;
    let total = user.staking_rewards_earned + amount;
    sqlx::query("UPDATE users SET staking_rewards_earned = ? WHERE id = ?")
        .bind(total.to_string())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(total)
}

pub async fn count_users(conn: &mut SqliteConnection) -> Result<i64, LendingError> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.try_get("n")?)
}

// --- loans ---

/// Inserts the loan and returns it with its assigned id.
pub async fn insert_loan(conn: &mut SqliteConnection, loan: &Loan) -> Result<Loan, LendingError> {
    let result = sqlx::query(
        "INSERT INTO loans
         (user_id, status, collateral_type, collateral_amount, collateral_value_usd,
          borrow_type, borrow_amount, borrow_value_usd, interest_rate, accrued_interest,
          initial_ltv, current_ltv, staking_yield_earned, created_at, updated_at,
          last_interest_update, closed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(loan.user_id)
    .bind(loan.status)
    .bind(loan.collateral_type)
    .bind(loan.collateral_amount.to_string())
    .bind(loan.collateral_value_usd.to_string())
    .bind(loan.borrow_type)
    .bind(loan.borrow_amount.to_string())
    .bind(loan.borrow_value_usd.to_string())
    .bind(loan.interest_rate.to_string())
    .bind(loan.accrued_interest.to_string())
    .bind(loan.initial_ltv.to_string())
    .bind(loan.current_ltv.to_string())
    .bind(loan.staking_yield_earned.to_string())
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .bind(loan.last_interest_update)
    .bind(loan.closed_at)
    .execute(&mut *conn)
    .await?;
    let id = result.last_insert_rowid();
    loan_by_id(conn, id)
        .await?
        .ok_or(LendingError::NotFound("Loan"))
}

pub async fn loan_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Loan>, LendingError> {
    let row = sqlx::query("SELECT * FROM loans WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_loan).transpose()
}

pub async fn loans_by_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Vec<Loan>, LendingError> {
    let rows = sqlx::query("SELECT * FROM loans WHERE user_id = ? ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_loan).collect()
}

/// Loans still carrying collateral and debt.
pub async fn open_loans(conn: &mut SqliteConnection) -> Result<Vec<Loan>, LendingError> {
    let rows =
        sqlx::query("SELECT * FROM loans WHERE status IN ('active', 'margin_call') ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
    rows.iter().map(map_loan).collect()
}

pub async fn open_loans_by_collateral(
    conn: &mut SqliteConnection,
    collateral: Asset,
) -> Result<Vec<Loan>, LendingError> {
    let rows = sqlx::query(
        "SELECT * FROM loans WHERE status IN ('active', 'margin_call') AND collateral_type = ? ORDER BY id",
    )
    .bind(collateral)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(map_loan).collect()
}

/// Persists every mutable loan field.
pub async fn update_loan(conn: &mut SqliteConnection, loan: &Loan) -> Result<(), LendingError> {
    sqlx::query(
        "UPDATE loans SET
         status = ?, collateral_amount = ?, borrow_amount = ?, accrued_interest = ?,
         current_ltv = ?, staking_yield_earned = ?, updated_at = ?,
         last_interest_update = ?, closed_at = ?
         WHERE id = ?",
    )
    .bind(loan.status)
    .bind(loan.collateral_amount.to_string())
    .bind(loan.borrow_amount.to_string())
    .bind(loan.accrued_interest.to_string())
    .bind(loan.current_ltv.to_string())
    .bind(loan.staking_yield_earned.to_string())
    .bind(loan.updated_at)
    .bind(loan.last_interest_update)
    .bind(loan.closed_at)
    .bind(loan.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// --- transactions ---

pub struct NewTx {
    pub user_id: i64,
    pub loan_id: Option<i64>,
    pub kind: TxKind,
    pub asset: Asset,
    pub amount: Decimal,
    pub value_usd: Option<Decimal>,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
}

pub async fn insert_tx(
    conn: &mut SqliteConnection,
    tx: NewTx,
) -> Result<TxRecord, LendingError> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO transactions
         (user_id, loan_id, kind, asset, amount, value_usd, tx_hash, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(tx.user_id)
    .bind(tx.loan_id)
    .bind(tx.kind)
    .bind(tx.asset)
    .bind(tx.amount.to_string())
    .bind(tx.value_usd.map(|v| v.to_string()))
    .bind(tx.tx_hash)
    .bind(tx.status)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let id = result.last_insert_rowid();
    let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    map_tx(&row)
}

pub async fn txs_by_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<TxRecord>, LendingError> {
    let rows = sqlx::query(
        "SELECT * FROM transactions WHERE user_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(map_tx).collect()
}

pub async fn deposits_by_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<TxRecord>, LendingError> {
    let rows = sqlx::query(
        "SELECT * FROM transactions
         WHERE user_id = ? AND kind IN ('deposit_xec', 'deposit_firma', 'firma_swap')
         ORDER BY id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(map_tx).collect()
}

pub async fn recent_txs(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<TxRecord>, LendingError> {
    let rows = sqlx::query("SELECT * FROM transactions ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_tx).collect()
}

pub async fn liquidation_txs(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<TxRecord>, LendingError> {
    let rows = sqlx::query(
        "SELECT * FROM transactions WHERE kind = 'liquidation' ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(map_tx).collect()
}

// --- staking pool ---

pub async fn staking_pool(conn: &mut SqliteConnection) -> Result<StakingPool, LendingError> {
    let row = sqlx::query("SELECT * FROM staking_pool WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    map_pool(&row)
}

pub async fn update_staking_pool(
    conn: &mut SqliteConnection,
    pool: &StakingPool,
) -> Result<(), LendingError> {
    sqlx::query(
        "UPDATE staking_pool SET
         platform_base = ?, user_contributed = ?, total = ?,
         last_reward_distribution = ?, total_rewards_distributed = ?
         WHERE id = 1",
    )
    .bind(pool.platform_base.to_string())
    .bind(pool.user_contributed.to_string())
    .bind(pool.total.to_string())
    .bind(pool.last_reward_distribution)
    .bind(pool.total_rewards_distributed.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// --- escrow wallets ---

pub async fn escrow_wallets(
    conn: &mut SqliteConnection,
) -> Result<Vec<EscrowWallet>, LendingError> {
    let rows = sqlx::query("SELECT * FROM escrow_wallets ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_escrow).collect()
}

pub async fn register_escrow_wallet(
    conn: &mut SqliteConnection,
    chain: WalletKind,
    address: &str,
    asset: Asset,
) -> Result<(), LendingError> {
    sqlx::query(
        "INSERT OR IGNORE INTO escrow_wallets (chain, address, asset, balance, updated_at)
         VALUES (?, ?, ?, '0', ?)",
    )
    .bind(chain)
    .bind(address)
    .bind(asset)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Records an observed escrow balance; no effect on user funds.
pub async fn set_escrow_balance(
    conn: &mut SqliteConnection,
    wallet_id: i64,
    balance: Decimal,
) -> Result<(), LendingError> {
    sqlx::query("UPDATE escrow_wallets SET balance = ?, updated_at = ? WHERE id = ?")
        .bind(balance.to_string())
        .bind(Utc::now())
        .bind(wallet_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// --- margin-call log ---

pub async fn insert_margin_call(
    conn: &mut SqliteConnection,
    loan_id: i64,
    user_id: i64,
    ltv: Decimal,
    alert_type: AlertType,
) -> Result<MarginCallEntry, LendingError> {
    let result = sqlx::query(
        "INSERT INTO margin_calls (loan_id, user_id, ltv, alert_type, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(loan_id)
    .bind(user_id)
    .bind(ltv.to_string())
    .bind(alert_type)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    let id = result.last_insert_rowid();
    let row = sqlx::query("SELECT * FROM margin_calls WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    map_margin_call(&row)
}

pub async fn margin_calls_by_loan(
    conn: &mut SqliteConnection,
    loan_id: i64,
) -> Result<Vec<MarginCallEntry>, LendingError> {
    let rows = sqlx::query("SELECT * FROM margin_calls WHERE loan_id = ? ORDER BY id")
        .bind(loan_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_margin_call).collect()
}

// --- price cache ---

pub async fn cached_price(
    conn: &mut SqliteConnection,
    asset: Asset,
) -> Result<Option<PricePoint>, LendingError> {
    let row = sqlx::query("SELECT * FROM prices WHERE asset = ?")
        .bind(asset)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_price).transpose()
}

pub async fn store_price(
    conn: &mut SqliteConnection,
    asset: Asset,
    price_usd: Decimal,
    source: PriceSource,
) -> Result<(), LendingError> {
    sqlx::query(
        "INSERT INTO prices (asset, price_usd, source, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(asset) DO UPDATE SET price_usd = excluded.price_usd,
         source = excluded.source, updated_at = excluded.updated_at",
    )
    .bind(asset)
    .bind(price_usd.to_string())
    .bind(source)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}
