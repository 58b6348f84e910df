#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use common_structs::{Asset, Loan, MarginCallEntry, StakingPool, TxRecord, User, WalletKind};
use rust_decimal::Decimal;

use controller::config::{AppConfig, RiskParams};
use controller::storage::{self, Ledger};
use controller::{deposits, AppState};

static ADDRESS_SEQ: AtomicU64 = AtomicU64::new(1);

/// One fully wired lending core over a private in-memory ledger, with an
/// unreachable price feed so every price comes from the seeded caches.
pub struct LendingTestState {
    pub state: AppState,
}

impl LendingTestState {
    pub async fn new() -> Self {
        let config = AppConfig {
            port: 0,
            frontend_url: None,
            database_path: ":memory:".to_owned(),
            // Nothing listens on the discard port; the oracle must fall back
            // to its caches, never the network.
            feed_url: "http://127.0.0.1:9/api/v3".to_owned(),
            escrow_xec_address: Some("ecash:qq-platform-escrow".to_owned()),
            escrow_solana_address: Some("So1PlatformEscrow111111111111111111".to_owned()),
            indexer_url: None,
            risk: RiskParams::default(),
        };
        let ledger = Ledger::in_memory().await.expect("in-memory ledger");
        let state = AppState::assemble(config, ledger)
            .await
            .expect("assemble lending core");
        Self { state }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// Creates a user and funds it through the deposit flow, so the
    /// transaction log matches the balances from the start.
    pub async fn create_user(&self, xec: Decimal, firma: Decimal) -> User {
        let seq = ADDRESS_SEQ.fetch_add(1, Ordering::Relaxed);
        let address = format!("ecash:qtest{seq:08}");
        let mut tx = self.ledger().begin().await.expect("begin");
        let user = storage::insert_user(&mut *tx, WalletKind::Ecash, &address)
            .await
            .expect("insert user");
        tx.commit().await.expect("commit");

        let prices = self.state.oracle.snapshot().await;
        if xec > Decimal::ZERO {
            deposits::credit_deposit(
                self.ledger(),
                &self.state.bus,
                &prices,
                user.id,
                Asset::Xec,
                xec,
                None,
            )
            .await
            .expect("fund xec");
        }
        if firma > Decimal::ZERO {
            deposits::credit_deposit(
                self.ledger(),
                &self.state.bus,
                &prices,
                user.id,
                Asset::Firma,
                firma,
                None,
            )
            .await
            .expect("fund firma");
        }
        self.user(user.id).await
    }

    /// Standard XEC-collateralised FIRMA loan.
    pub async fn open_loan(
        &self,
        user_id: i64,
        collateral_xec: Decimal,
        borrow_firma: Decimal,
    ) -> Loan {
        self.state
            .engine
            .create_loan(user_id, Asset::Xec, collateral_xec, Asset::Firma, borrow_firma)
            .await
            .expect("create loan")
    }

    pub async fn set_xec_price(&self, price: Decimal) {
        self.state
            .oracle
            .set_price(Asset::Xec, price)
            .await
            .expect("set price");
    }

    pub async fn user(&self, id: i64) -> User {
        let mut conn = self.ledger().pool().acquire().await.expect("conn");
        storage::user_by_id(&mut conn, id)
            .await
            .expect("query user")
            .expect("user exists")
    }

    pub async fn loan(&self, id: i64) -> Loan {
        let mut conn = self.ledger().pool().acquire().await.expect("conn");
        storage::loan_by_id(&mut conn, id)
            .await
            .expect("query loan")
            .expect("loan exists")
    }

    pub async fn staking_pool(&self) -> StakingPool {
        let mut conn = self.ledger().pool().acquire().await.expect("conn");
        storage::staking_pool(&mut conn).await.expect("staking pool")
    }

    pub async fn margin_calls(&self, loan_id: i64) -> Vec<MarginCallEntry> {
        let mut conn = self.ledger().pool().acquire().await.expect("conn");
        storage::margin_calls_by_loan(&mut conn, loan_id)
            .await
            .expect("margin calls")
    }

    pub async fn transactions(&self, user_id: i64) -> Vec<TxRecord> {
        let mut conn = self.ledger().pool().acquire().await.expect("conn");
        storage::txs_by_user(&mut conn, user_id, 500)
            .await
            .expect("transactions")
    }

    /// Rewinds a loan's accrual clock, standing in for elapsed wall time.
    pub async fn backdate_interest(&self, loan_id: i64, hours: i64) {
        let stamp = Utc::now() - Duration::hours(hours);
        sqlx::query("UPDATE loans SET last_interest_update = ? WHERE id = ?")
            .bind(stamp)
            .bind(loan_id)
            .execute(self.ledger().pool())
            .await
            .expect("backdate interest");
    }

    /// Rewinds the staking pool's last payout stamp by whole days.
    pub async fn backdate_distribution(&self, days: i64) {
        let stamp = Utc::now() - Duration::days(days);
        sqlx::query("UPDATE staking_pool SET last_reward_distribution = ? WHERE id = 1")
            .bind(stamp)
            .execute(self.ledger().pool())
            .await
            .expect("backdate distribution");
    }

    /// Drains every frame currently queued on a bus subscription.
    pub fn drain_frames(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
    ) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("frame is json"));
        }
        frames
    }
}
