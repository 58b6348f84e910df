//! Lending engine for the over-collateralised XEC/FIRMA loan service:
//! price oracle, transactional loan ledger, loan engine, risk loop, staking
//! distributor, real-time notification bus and the HTTP/WebSocket surface.

pub mod config;
pub mod deposits;
pub mod indexer;
pub mod oracle;
pub mod positions;
pub mod router;
pub mod scheduler;
pub mod staking;
pub mod storage;
pub mod validation;
pub mod views;
pub mod ws;

use std::sync::Arc;

use common_errors::LendingError;
use common_structs::{Asset, WalletKind};

use crate::config::AppConfig;
use crate::indexer::ChainIndexer;
use crate::oracle::PriceOracle;
use crate::positions::{LoanEngine, RiskEngine};
use crate::staking::StakingDistributor;
use crate::storage::Ledger;
use crate::ws::NotificationBus;

/// Long-lived component graph shared by request handlers and tickers. Every
/// shared resource is constructed once here and passed down; there are no
/// ambient process globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ledger: Ledger,
    pub oracle: Arc<PriceOracle>,
    pub bus: Arc<NotificationBus>,
    pub engine: Arc<LoanEngine>,
    pub risk: Arc<RiskEngine>,
    pub staking: Arc<StakingDistributor>,
    pub indexer: Arc<ChainIndexer>,
}

impl AppState {
    /// Builds the component graph over an already-connected ledger and runs
    /// the schema bootstrap.
    pub async fn assemble(config: AppConfig, ledger: Ledger) -> Result<Self, LendingError> {
        ledger.bootstrap().await?;

        if config.escrow_xec_address.is_some() || config.escrow_solana_address.is_some() {
            let mut conn = ledger.pool().acquire().await?;
            if let Some(address) = &config.escrow_xec_address {
                storage::register_escrow_wallet(&mut conn, WalletKind::Ecash, address, Asset::Xec)
                    .await?;
            }
            if let Some(address) = &config.escrow_solana_address {
                storage::register_escrow_wallet(
                    &mut conn,
                    WalletKind::Solana,
                    address,
                    Asset::Firma,
                )
                .await?;
            }
        }

        let oracle = Arc::new(PriceOracle::new(ledger.clone(), config.feed_url.clone()).await?);
        let bus = Arc::new(NotificationBus::new());
        let engine = Arc::new(LoanEngine::new(
            ledger.clone(),
            oracle.clone(),
            bus.clone(),
            config.risk.clone(),
        ));
        let risk = Arc::new(RiskEngine::new(
            ledger.clone(),
            oracle.clone(),
            bus.clone(),
            config.risk.clone(),
        ));
        let staking = Arc::new(StakingDistributor::new(
            ledger.clone(),
            bus.clone(),
            config.risk.clone(),
        ));
        let indexer = Arc::new(ChainIndexer::new(config.indexer_url.clone())?);

        Ok(Self {
            config: Arc::new(config),
            ledger,
            oracle,
            bus,
            engine,
            risk,
            staking,
            indexer,
        })
    }
}
