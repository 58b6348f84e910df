mod setup;

use common_structs::Asset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use setup::LendingTestState;

/// FIRMA is pegged: always exactly 1 USD, regardless of the caches.
#[tokio::test]
async fn firma_is_always_the_peg() {
    let state = LendingTestState::new().await;
    assert_eq!(state.state.oracle.get_price(Asset::Firma).await, dec!(1.0));

    // Attempting to override the peg is ignored.
    state
        .state
        .oracle
        .set_price(Asset::Firma, dec!(0.5))
        .await
        .expect("no-op");
    assert_eq!(state.state.oracle.get_price(Asset::Firma).await, dec!(1.0));
}

/// With no feed reachable, prices come from the seeded defaults.
#[tokio::test]
async fn falls_back_to_seeded_default() {
    let state = LendingTestState::new().await;
    assert_eq!(state.state.oracle.get_price(Asset::Xec).await, dec!(0.00003));
}

/// XECX shadows the native coin's price everywhere.
#[tokio::test]
async fn xecx_shadows_xec() {
    let state = LendingTestState::new().await;
    state.set_xec_price(dec!(0.00005)).await;

    assert_eq!(state.state.oracle.get_price(Asset::Xecx).await, dec!(0.00005));
    let prices = state.state.oracle.all_prices();
    assert_eq!(prices[&Asset::Xec], dec!(0.00005));
    assert_eq!(prices[&Asset::Xecx], dec!(0.00005));
    assert_eq!(prices[&Asset::Firma], dec!(1.0));
}

/// A failed refresh keeps serving the cached price rather than erroring.
#[tokio::test]
async fn refresh_failure_keeps_cached_price() {
    let state = LendingTestState::new().await;
    state.set_xec_price(dec!(0.00004)).await;

    let snapshot = state.state.oracle.refresh().await;
    assert_eq!(snapshot[&Asset::Xec], dec!(0.00004));
}

/// USD conversions round-trip through the same price.
#[tokio::test]
async fn usd_conversions() {
    let state = LendingTestState::new().await;

    let usd = state.state.oracle.to_usd(Asset::Xec, dec!(1_000_000)).await;
    assert_eq!(usd, dec!(30));
    let coins = state.state.oracle.from_usd(Asset::Xec, dec!(30)).await;
    assert_eq!(coins, dec!(1_000_000));

    // A zero price converts to zero rather than dividing by it.
    state.set_xec_price(Decimal::ZERO).await;
    assert_eq!(
        state.state.oracle.from_usd(Asset::Xec, dec!(30)).await,
        Decimal::ZERO
    );
}
