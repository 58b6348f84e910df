mod setup;

use common_structs::TxKind;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use setup::LendingTestState;

/// The worked distribution: pool 4 050 000, daily reward 405, split 1:3
/// across two XEC-collateralised loans.
#[tokio::test]
async fn daily_distribution_is_proportional() {
    let state = LendingTestState::new().await;
    let small = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let large = state.create_user(dec!(3_000_000), Decimal::ZERO).await;
    let small_loan = state.open_loan(small.id, dec!(1_000_000), dec!(10)).await;
    let large_loan = state.open_loan(large.id, dec!(3_000_000), dec!(30)).await;

    let pool = state.staking_pool().await;
    assert_eq!(pool.total, dec!(4_050_000));

    let mut small_rx = state.state.bus.subscribe(small.id);

    let outcome = state
        .state
        .staking
        .distribute_daily()
        .await
        .expect("distribute");
    assert_eq!(outcome.distributed, dec!(405));
    assert_eq!(outcome.recipients, 2);

    assert_eq!(
        state.loan(small_loan.id).await.staking_yield_earned,
        dec!(101.25)
    );
    assert_eq!(
        state.loan(large_loan.id).await.staking_yield_earned,
        dec!(303.75)
    );
    assert_eq!(
        state.user(small.id).await.staking_rewards_earned,
        dec!(101.25)
    );
    assert_eq!(
        state.user(large.id).await.staking_rewards_earned,
        dec!(303.75)
    );

    let pool = state.staking_pool().await;
    assert_eq!(pool.total_rewards_distributed, dec!(405));
    assert!(pool.last_reward_distribution.is_some());

    let rewards: Vec<_> = state
        .transactions(small.id)
        .await
        .into_iter()
        .filter(|tx| tx.kind == TxKind::StakingReward)
        .collect();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].amount, dec!(101.25));

    let frames = LendingTestState::drain_frames(&mut small_rx);
    let reward_frames: Vec<_> = frames
        .iter()
        .filter(|frame| frame["type"] == "staking:reward")
        .collect();
    assert_eq!(reward_frames.len(), 1);
    assert_eq!(reward_frames[0]["data"]["amount"], 101.25);
}

/// At most one payout per UTC day; the same-day rerun is a no-op.
#[tokio::test]
async fn distribution_runs_once_per_day() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(10)).await;

    let first = state
        .state
        .staking
        .distribute_daily()
        .await
        .expect("first run");
    assert_eq!(first.recipients, 1);

    let second = state
        .state
        .staking
        .distribute_daily()
        .await
        .expect("same-day rerun");
    assert_eq!(second.recipients, 0);
    assert_eq!(second.distributed, Decimal::ZERO);

    let earned_after_first = state.loan(loan.id).await.staking_yield_earned;

    // The guard releases on the next UTC day.
    state.backdate_distribution(1).await;
    let third = state
        .state
        .staking
        .distribute_daily()
        .await
        .expect("next day");
    assert_eq!(third.recipients, 1);
    assert!(state.loan(loan.id).await.staking_yield_earned > earned_after_first);
}

/// No XEC-collateralised loans means nothing to pay and no stamp.
#[tokio::test]
async fn distribution_without_recipients_is_a_noop() {
    let state = LendingTestState::new().await;

    let outcome = state
        .state
        .staking
        .distribute_daily()
        .await
        .expect("empty run");
    assert_eq!(outcome.recipients, 0);
    assert_eq!(outcome.distributed, Decimal::ZERO);
    assert!(state.staking_pool().await.last_reward_distribution.is_none());
}

/// A user's staking share is their open XEC collateral over the whole pool.
#[tokio::test]
async fn user_staking_share() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    state.open_loan(user.id, dec!(1_000_000), dec!(10)).await;

    let share = state
        .state
        .staking
        .calculate_user_staking_share(user.id)
        .await
        .expect("share");
    // 1 000 000 over 1 050 000.
    assert_eq!(share, dec!(1_000_000) / dec!(1_050_000));

    let stranger = state.create_user(Decimal::ZERO, dec!(5)).await;
    let share = state
        .state
        .staking
        .calculate_user_staking_share(stranger.id)
        .await
        .expect("share");
    assert_eq!(share, Decimal::ZERO);
}

/// Pool invariants survive contribution and clamped removal.
#[tokio::test]
async fn pool_total_stays_above_platform_base() {
    let state = LendingTestState::new().await;
    let user = state.create_user(dec!(1_000_000), Decimal::ZERO).await;
    let loan = state.open_loan(user.id, dec!(1_000_000), dec!(15)).await;

    let pool = state.staking_pool().await;
    assert_eq!(pool.total, pool.platform_base + pool.user_contributed);

    state
        .state
        .engine
        .repay_loan(loan.id, user.id, dec!(15))
        .await
        .expect("close");

    let pool = state.staking_pool().await;
    assert_eq!(pool.user_contributed, Decimal::ZERO);
    assert_eq!(pool.total, pool.platform_base);
    assert!(pool.user_contributed >= Decimal::ZERO);
    assert!(pool.total >= pool.platform_base);
}
