//! Composite price source: pegged constant, memory cache, durable cache,
//! external feed, hard defaults. Every valuation in the core goes through
//! here, and always before a ledger transaction is opened.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use common_constants::{
    DEFAULT_XEC_PRICE, FIRMA_PEG_PRICE, PRICE_FETCH_TIMEOUT_SECS, PRICE_TTL_SECS,
};
use common_errors::LendingError;
use common_structs::{Asset, PricePoint, PriceSource};
use rust_decimal::Decimal;

use crate::storage::{self, Ledger};

/// Immutable view of all prices at a single instant, captured before a
/// ledger transaction and passed in (no network inside a unit of work).
#[derive(Debug, Clone, Copy)]
pub struct PriceSnapshot {
    xec: Decimal,
    firma: Decimal,
}

impl PriceSnapshot {
    pub fn price(&self, asset: Asset) -> Decimal {
        match asset {
            // XECX is the staking-wrapped native coin and shadows its price.
            Asset::Xec | Asset::Xecx => self.xec,
            Asset::Firma => self.firma,
        }
    }

    pub fn to_usd(&self, asset: Asset, amount: Decimal) -> Decimal {
        amount * self.price(asset)
    }

    pub fn from_usd(&self, asset: Asset, usd: Decimal) -> Decimal {
        let price = self.price(asset);
        if price.is_zero() {
            Decimal::ZERO
        } else {
            usd / price
        }
    }
}

pub struct PriceOracle {
    http: reqwest::Client,
    ledger: Ledger,
    feed_url: String,
    /// Memoised native-coin price; FIRMA is pegged and never cached.
    native: RwLock<PricePoint>,
}

impl PriceOracle {
    pub async fn new(ledger: Ledger, feed_url: String) -> Result<Self, LendingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(PRICE_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|err| LendingError::PriceFeed(err.to_string()))?;
        // Prime memory from the durable cache so the first snapshot never
        // blocks on the feed.
        let mut conn = ledger.pool().acquire().await?;
        let native = storage::cached_price(&mut conn, Asset::Xec)
            .await?
            .unwrap_or(PricePoint {
                asset: Asset::Xec,
                price_usd: DEFAULT_XEC_PRICE,
                source: PriceSource::Default,
                updated_at: Utc::now(),
            });
        drop(conn);
        Ok(Self {
            http,
            ledger,
            feed_url,
            native: RwLock::new(native),
        })
    }

    /// USD price for an asset. FIRMA is the pegged constant; the native coin
    /// follows memory cache → feed → durable cache → configured default.
    pub async fn get_price(&self, asset: Asset) -> Decimal {
        if asset == Asset::Firma {
            return FIRMA_PEG_PRICE;
        }
        {
            let cached = self.native.read().expect("price cache poisoned");
            let age = Utc::now().signed_duration_since(cached.updated_at);
            if age.num_seconds() < PRICE_TTL_SECS as i64 {
                return cached.price_usd;
            }
        }
        match self.fetch_native().await {
            Ok(price) => price,
            Err(err) => {
                tracing::warn!(error = %err, "price feed unavailable, falling back to cache");
                self.durable_fallback().await
            }
        }
    }

    pub async fn to_usd(&self, asset: Asset, amount: Decimal) -> Decimal {
        amount * self.get_price(asset).await
    }

    pub async fn from_usd(&self, asset: Asset, usd: Decimal) -> Decimal {
        let price = self.get_price(asset).await;
        if price.is_zero() {
            Decimal::ZERO
        } else {
            usd / price
        }
    }

    /// Memoised snapshot of every tracked asset, used by tick broadcasts.
    pub fn all_prices(&self) -> BTreeMap<Asset, Decimal> {
        let native = self.native.read().expect("price cache poisoned").price_usd;
        BTreeMap::from([
            (Asset::Xec, native),
            (Asset::Xecx, native),
            (Asset::Firma, FIRMA_PEG_PRICE),
        ])
    }

    /// Captures all prices once, for use inside a ledger transaction.
    pub async fn snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            xec: self.get_price(Asset::Xec).await,
            firma: FIRMA_PEG_PRICE,
        }
    }

    /// Scheduler entry: force-fetch the feed (TTL ignored), then return the
    /// snapshot for the `prices:update` broadcast. Feed failures fall back
    /// and are never surfaced.
    pub async fn refresh(&self) -> BTreeMap<Asset, Decimal> {
        if let Err(err) = self.fetch_native().await {
            tracing::warn!(error = %err, "price refresh failed, keeping cached price");
        }
        self.all_prices()
    }

    /// Overrides the native-coin price in both caches. Operational hook; the
    /// integration tests drive market moves through it.
    pub async fn set_price(&self, asset: Asset, price_usd: Decimal) -> Result<(), LendingError> {
        self.store(asset, price_usd, PriceSource::Cache).await
    }

    async fn fetch_native(&self) -> Result<Decimal, LendingError> {
        let url = format!("{}/simple/price", self.feed_url.trim_end_matches('/'));
        let body: serde_json::Value = self
            .http
            .get(url)
            .query(&[("ids", "ecash"), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|err| LendingError::PriceFeed(err.to_string()))?
            .error_for_status()
            .map_err(|err| LendingError::PriceFeed(err.to_string()))?
            .json()
            .await
            .map_err(|err| LendingError::PriceFeed(err.to_string()))?;
        let raw = body
            .get("ecash")
            .and_then(|entry| entry.get("usd"))
            .and_then(|price| price.as_f64())
            .ok_or_else(|| LendingError::PriceFeed("malformed feed response".to_owned()))?;
        let price = Decimal::try_from(raw)
            .map_err(|err| LendingError::PriceFeed(err.to_string()))?;
        self.store(Asset::Xec, price, PriceSource::Feed).await?;
        Ok(price)
    }

    async fn store(
        &self,
        asset: Asset,
        price_usd: Decimal,
        source: PriceSource,
    ) -> Result<(), LendingError> {
        if asset == Asset::Firma {
            return Ok(());
        }
        let point = PricePoint {
            asset: Asset::Xec,
            price_usd,
            source,
            updated_at: Utc::now(),
        };
        {
            let mut cached = self.native.write().expect("price cache poisoned");
            *cached = point;
        }
        let mut conn = self.ledger.pool().acquire().await?;
        storage::store_price(&mut conn, Asset::Xec, price_usd, source).await?;
        storage::store_price(&mut conn, Asset::Xecx, price_usd, source).await?;
        Ok(())
    }

    async fn durable_fallback(&self) -> Decimal {
        let cached = async {
            let mut conn = self.ledger.pool().acquire().await?;
            storage::cached_price(&mut conn, Asset::Xec).await
        }
        .await;
        match cached {
            Ok(Some(point)) => {
                let mut memory = self.native.write().expect("price cache poisoned");
                *memory = PricePoint {
                    source: PriceSource::Cache,
                    ..point
                };
                memory.price_usd
            }
            _ => DEFAULT_XEC_PRICE,
        }
    }
}
