use anyhow::Context;
use tracing_subscriber::EnvFilter;

use controller::config::AppConfig;
use controller::storage::Ledger;
use controller::{router, scheduler, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let port = config.port;

    let ledger = Ledger::connect(&config.database_path)
        .await
        .context("opening ledger database")?;
    let state = AppState::assemble(config, ledger)
        .await
        .context("assembling lending core")?;

    scheduler::spawn(state.clone());

    let app = router::build(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "lending engine listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
