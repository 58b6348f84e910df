//! Periodic tick drivers. Every task is fire-and-forget: failures are
//! logged, the next tick proceeds, and overlapping work serialises on the
//! ledger's single writer.

use std::time::Duration;

use chrono::Utc;
use common_events::Event;
use tokio::time::MissedTickBehavior;

use common_constants::{INTEREST_TICK_SECS, PRICE_TICK_SECS, RISK_TICK_SECS};

use crate::{storage, AppState};

pub fn spawn(state: AppState) {
    tokio::spawn(price_tick(state.clone()));
    tokio::spawn(risk_tick(state.clone()));
    tokio::spawn(interest_tick(state.clone()));
    tokio::spawn(distribution_tick(state));
}

/// Every minute: refresh the oracle, broadcast prices, recompute LTVs and
/// reconcile escrow wallet balances from the indexer.
async fn price_tick(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(PRICE_TICK_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let snapshot = state.oracle.refresh().await;
        state.bus.publish(&Event::prices_update(snapshot));
        if let Err(err) = state.engine.update_all_ltvs().await {
            tracing::error!(error = %err, "ltv update tick failed");
        }
        if let Err(err) = reconcile_escrow(&state).await {
            tracing::error!(error = %err, "escrow reconciliation failed");
        }
    }
}

async fn risk_tick(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(RISK_TICK_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        match state.risk.scan_and_liquidate().await {
            Ok(liquidated) if !liquidated.is_empty() => {
                tracing::info!(count = liquidated.len(), "liquidated underwater loans");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "liquidation scan failed"),
        }
    }
}

async fn interest_tick(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(INTEREST_TICK_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let loans = {
            let mut conn = match state.ledger.pool().acquire().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!(error = %err, "interest tick could not reach ledger");
                    continue;
                }
            };
            match storage::open_loans(&mut conn).await {
                Ok(loans) => loans,
                Err(err) => {
                    tracing::error!(error = %err, "interest tick could not list loans");
                    continue;
                }
            }
        };
        for loan in loans {
            if let Err(err) = state.engine.accrue_interest(loan.id).await {
                tracing::error!(loan = loan.id, error = %err, "interest accrual failed");
            }
        }
    }
}

/// Daily staking payout at 00:00 UTC; the distributor itself enforces the
/// once-per-day guard, so a delayed wake-up cannot double-pay.
async fn distribution_tick(state: AppState) {
    loop {
        tokio::time::sleep(until_next_utc_midnight()).await;
        match state.staking.distribute_daily().await {
            Ok(outcome) if outcome.recipients > 0 => {
                tracing::info!(
                    distributed = %outcome.distributed,
                    recipients = outcome.recipients,
                    "staking rewards distributed"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "staking distribution failed"),
        }
    }
}

fn until_next_utc_midnight() -> Duration {
    let now = Utc::now();
    let next = (now + chrono::Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}

async fn reconcile_escrow(state: &AppState) -> Result<(), common_errors::LendingError> {
    if !state.indexer.is_enabled() {
        return Ok(());
    }
    let wallets = {
        let mut conn = state.ledger.pool().acquire().await?;
        storage::escrow_wallets(&mut conn).await?
    };
    for wallet in wallets {
        let observed = match state.indexer.observed_balance(&wallet).await {
            Ok(balance) => balance,
            Err(err) => {
                tracing::warn!(address = %wallet.address, error = %err, "escrow lookup failed");
                continue;
            }
        };
        if observed != wallet.balance {
            let mut conn = state.ledger.pool().acquire().await?;
            storage::set_escrow_balance(&mut conn, wallet.id, observed).await?;
            state.bus.publish(&Event::escrow_transaction(
                wallet.chain.as_str(),
                &wallet.address,
                wallet.asset,
                observed,
            ));
        }
    }
    Ok(())
}
