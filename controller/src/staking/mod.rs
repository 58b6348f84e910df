//! Staking pool upkeep and the daily proportional yield payout to borrowers
//! collateralised in the native coin.

use std::sync::Arc;

use chrono::Utc;
use common_errors::LendingError;
use common_events::Event;
use common_structs::{Asset, StakingPool, TxKind, TxStatus};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::config::RiskParams;
use crate::storage::{self, Ledger, NewTx};
use crate::ws::NotificationBus;

/// Records an XEC collateral addition in the pool. Rides inside the caller's
/// ledger transaction.
pub async fn pool_contribute(
    conn: &mut SqliteConnection,
    amount: Decimal,
) -> Result<(), LendingError> {
    let mut pool = storage::staking_pool(conn).await?;
    pool.user_contributed += amount;
    pool.total += amount;
    storage::update_staking_pool(conn, &pool).await
}

/// Inverse of [`pool_contribute`], clamped so the pool never drops below the
/// platform base and user contributions never go negative.
pub async fn pool_withdraw(
    conn: &mut SqliteConnection,
    amount: Decimal,
) -> Result<(), LendingError> {
    let mut pool = storage::staking_pool(conn).await?;
    pool.user_contributed = (pool.user_contributed - amount).max(Decimal::ZERO);
    pool.total = (pool.total - amount).max(pool.platform_base);
    storage::update_staking_pool(conn, &pool).await
}

#[derive(Debug, Clone, Default)]
pub struct DistributionOutcome {
    pub distributed: Decimal,
    pub recipients: usize,
}

pub struct StakingDistributor {
    ledger: Ledger,
    bus: Arc<NotificationBus>,
    params: RiskParams,
}

impl StakingDistributor {
    pub fn new(ledger: Ledger, bus: Arc<NotificationBus>, params: RiskParams) -> Self {
        Self {
            ledger,
            bus,
            params,
        }
    }

    pub async fn pool(&self) -> Result<StakingPool, LendingError> {
        let mut conn = self.ledger.pool().acquire().await?;
        storage::staking_pool(&mut conn).await
    }

    /// Pays the daily yield proportionally across open XEC-collateralised
    /// loans. One ledger transaction; at most one payout per UTC day.
    pub async fn distribute_daily(&self) -> Result<DistributionOutcome, LendingError> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;
        let mut pool = storage::staking_pool(&mut *tx).await?;
        if let Some(last) = pool.last_reward_distribution {
            if last.date_naive() == now.date_naive() {
                return Ok(DistributionOutcome::default());
            }
        }

        let daily_reward = pool.total * self.params.daily_yield_rate;
        let loans = storage::open_loans_by_collateral(&mut *tx, Asset::Xec).await?;
        let user_collateral_sum: Decimal =
            loans.iter().map(|loan| loan.collateral_amount).sum();
        if user_collateral_sum.is_zero() {
            return Ok(DistributionOutcome::default());
        }

        let mut per_user: Vec<(i64, Decimal)> = Vec::new();
        let mut distributed = Decimal::ZERO;
        for mut loan in loans {
            let reward = daily_reward * (loan.collateral_amount / user_collateral_sum);
            loan.staking_yield_earned += reward;
            loan.updated_at = now;
            storage::update_loan(&mut *tx, &loan).await?;
            distributed += reward;
            match per_user.iter_mut().find(|(id, _)| *id == loan.user_id) {
                Some((_, total)) => *total += reward,
                None => per_user.push((loan.user_id, reward)),
            }
        }

        let mut events = Vec::with_capacity(per_user.len());
        for (user_id, reward) in &per_user {
            let total_earned = storage::add_staking_rewards(&mut *tx, *user_id, *reward).await?;
            storage::insert_tx(
                &mut *tx,
                NewTx {
                    user_id: *user_id,
                    loan_id: None,
                    kind: TxKind::StakingReward,
                    asset: Asset::Xec,
                    amount: *reward,
                    value_usd: None,
                    tx_hash: None,
                    status: TxStatus::Confirmed,
                },
            )
            .await?;
            events.push(Event::staking_reward(*user_id, *reward, total_earned));
        }

        pool.last_reward_distribution = Some(now);
        pool.total_rewards_distributed += distributed;
        storage::update_staking_pool(&mut *tx, &pool).await?;
        tx.commit().await?;

        self.bus.publish_all(&events);
        Ok(DistributionOutcome {
            distributed,
            recipients: per_user.len(),
        })
    }

    /// Share of the pool attributable to one user's open XEC loans.
    pub async fn calculate_user_staking_share(
        &self,
        user_id: i64,
    ) -> Result<Decimal, LendingError> {
        let mut conn = self.ledger.pool().acquire().await?;
        let pool = storage::staking_pool(&mut conn).await?;
        if pool.total.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let loans = storage::open_loans_by_collateral(&mut conn, Asset::Xec).await?;
        let user_collateral: Decimal = loans
            .iter()
            .filter(|loan| loan.user_id == user_id)
            .map(|loan| loan.collateral_amount)
            .sum();
        Ok(user_collateral / pool.total)
    }

    /// Hourly borrow cost net of the staking yield, floored at zero.
    pub fn effective_hourly_rate(&self) -> Decimal {
        self.params.effective_hourly_rate()
    }
}
