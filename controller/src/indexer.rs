//! Thin client for the external chain indexers, used only to reconcile
//! observed escrow wallet balances. Observational: nothing here has
//! authority over user funds.

use std::time::Duration;

use common_errors::LendingError;
use common_structs::EscrowWallet;
use rust_decimal::Decimal;

/// Block-explorer-style balance reader. When no explorer root is configured
/// the reconciliation tick is a no-op.
pub struct ChainIndexer {
    http: reqwest::Client,
    explorer_url: Option<String>,
}

impl ChainIndexer {
    pub fn new(explorer_url: Option<String>) -> Result<Self, LendingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| LendingError::Indexer(err.to_string()))?;
        Ok(Self { http, explorer_url })
    }

    pub fn is_enabled(&self) -> bool {
        self.explorer_url.is_some()
    }

    /// Observed balance for one escrow wallet, expecting an explorer payload
    /// shaped `{"balance": <number>}` per address and asset.
    pub async fn observed_balance(
        &self,
        wallet: &EscrowWallet,
    ) -> Result<Decimal, LendingError> {
        let Some(root) = &self.explorer_url else {
            return Ok(wallet.balance);
        };
        let url = format!(
            "{}/{}/address/{}/balance",
            root.trim_end_matches('/'),
            wallet.chain.as_str(),
            wallet.address,
        );
        let body: serde_json::Value = self
            .http
            .get(url)
            .query(&[("asset", wallet.asset.as_str())])
            .send()
            .await
            .map_err(|err| LendingError::Indexer(err.to_string()))?
            .error_for_status()
            .map_err(|err| LendingError::Indexer(err.to_string()))?
            .json()
            .await
            .map_err(|err| LendingError::Indexer(err.to_string()))?;
        let raw = body
            .get("balance")
            .and_then(|balance| balance.as_f64())
            .ok_or_else(|| LendingError::Indexer("malformed indexer response".to_owned()))?;
        Decimal::try_from(raw).map_err(|err| LendingError::Indexer(err.to_string()))
    }
}
