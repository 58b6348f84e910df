//! HTTP surface binding transport payloads to core operations. Every
//! mutating handler runs exactly one core operation; errors leave as
//! `{"error": "…"}` with the status mapping of the error design.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common_errors::LendingError;
use common_structs::{Asset, WalletKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::storage::{self, retry_once};
use crate::validation;
use crate::views::{
    CalculateView, EscrowSummaryView, EscrowWalletView, LoanConfigView, LoanView, PricesView,
    RepayView, StatsView, TxView, UserView,
};
use crate::{deposits, ws, AppState};

pub struct ApiError(LendingError);

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LendingError::Validation(_)
            | LendingError::InsufficientBalance { .. }
            | LendingError::LtvExceeded { .. }
            | LendingError::TerminalLoan => StatusCode::BAD_REQUEST,
            LendingError::NotFound(_) => StatusCode::NOT_FOUND,
            LendingError::Unauthorised => StatusCode::FORBIDDEN,
            LendingError::PriceFeed(_)
            | LendingError::Indexer(_)
            | LendingError::Ledger(_)
            | LendingError::CorruptRow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn amount_from(raw: f64) -> Result<Decimal, ApiError> {
    let amount = Decimal::try_from(raw)
        .map_err(|err| LendingError::Validation(format!("Invalid amount: {err}")))?;
    validation::require_positive(amount)?;
    Ok(amount)
}

pub fn build(state: AppState) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    cors = match &state.config.frontend_url {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(origin) => cors.allow_origin(origin),
            Err(_) => cors.allow_origin(Any),
        },
        None => cors.allow_origin(Any),
    };

    let api = Router::new()
        .route("/auth/ecash", post(auth_ecash))
        .route("/auth/solana", post(auth_solana))
        .route("/auth/link", post(auth_link))
        .route("/auth/user/:id", get(get_user))
        .route("/deposits/xec", post(deposit_xec))
        .route("/deposits/usdt-solana", post(deposit_usdt_solana))
        .route("/deposits/firma", post(deposit_firma))
        .route("/deposits/address/:user_id", get(deposit_addresses))
        .route("/deposits/:user_id", get(list_deposits))
        .route("/withdrawals/xec", post(withdraw_xec))
        .route("/withdrawals/firma", post(withdraw_firma))
        .route("/loans/config", get(loans_config))
        .route("/loans/calculate", post(loans_calculate))
        .route("/loans", post(create_loan))
        .route("/loans/user/:user_id", get(loans_by_user))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/repay", post(repay_loan))
        .route("/loans/:id/add-collateral", post(add_collateral))
        .route("/prices", get(get_prices))
        .route("/stats", get(get_stats))
        .route("/escrow/summary", get(escrow_summary))
        .route("/escrow/wallets", get(escrow_wallets))
        .route("/escrow/transactions", get(escrow_transactions))
        .route("/escrow/liquidations", get(escrow_liquidations));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// --- auth ---

#[derive(Deserialize)]
struct AuthPayload {
    address: String,
    // Accepted for forward compatibility; addresses are authoritative.
    #[allow(dead_code)]
    signature: Option<String>,
    #[allow(dead_code)]
    message: Option<String>,
}

async fn upsert_user(
    state: &AppState,
    wallet: WalletKind,
    address: &str,
) -> Result<UserView, ApiError> {
    validation::require_address(address)?;
    let mut tx = state.ledger.begin().await?;
    let user = match storage::user_by_address(&mut *tx, wallet, address).await? {
        Some(user) => user,
        None => storage::insert_user(&mut *tx, wallet, address).await?,
    };
    tx.commit().await.map_err(LendingError::from)?;
    Ok(UserView::from(&user))
}

async fn auth_ecash(
    State(state): State<AppState>,
    Json(payload): Json<AuthPayload>,
) -> ApiResult<UserView> {
    Ok(Json(
        upsert_user(&state, WalletKind::Ecash, &payload.address).await?,
    ))
}

async fn auth_solana(
    State(state): State<AppState>,
    Json(payload): Json<AuthPayload>,
) -> ApiResult<UserView> {
    Ok(Json(
        upsert_user(&state, WalletKind::Solana, &payload.address).await?,
    ))
}

#[derive(Deserialize)]
struct LinkPayload {
    user_id: i64,
    wallet_type: String,
    address: String,
}

async fn auth_link(
    State(state): State<AppState>,
    Json(payload): Json<LinkPayload>,
) -> ApiResult<UserView> {
    validation::require_address(&payload.address)?;
    let wallet = WalletKind::parse(&payload.wallet_type).ok_or_else(|| {
        LendingError::Validation(common_errors::ERROR_WALLET_TYPE_UNKNOWN.to_owned())
    })?;
    let mut tx = state.ledger.begin().await?;
    let user = storage::link_address(&mut *tx, payload.user_id, wallet, &payload.address).await?;
    tx.commit().await.map_err(LendingError::from)?;
    Ok(Json(UserView::from(&user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<UserView> {
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let user = storage::user_by_id(&mut conn, id)
        .await?
        .ok_or(LendingError::NotFound("User"))?;
    Ok(Json(UserView::from(&user)))
}

// --- deposits & withdrawals ---

#[derive(Deserialize)]
struct DepositPayload {
    user_id: i64,
    amount: f64,
    tx_hash: Option<String>,
    signature: Option<String>,
}

async fn deposit_xec(
    State(state): State<AppState>,
    Json(payload): Json<DepositPayload>,
) -> ApiResult<TxView> {
    let amount = amount_from(payload.amount)?;
    let prices = state.oracle.snapshot().await;
    let record = retry_once(|| {
        deposits::credit_deposit(
            &state.ledger,
            &state.bus,
            &prices,
            payload.user_id,
            Asset::Xec,
            amount,
            payload.tx_hash.clone(),
        )
    })
    .await?;
    Ok(Json(TxView::from(&record)))
}

async fn deposit_firma(
    State(state): State<AppState>,
    Json(payload): Json<DepositPayload>,
) -> ApiResult<TxView> {
    let amount = amount_from(payload.amount)?;
    let prices = state.oracle.snapshot().await;
    let record = retry_once(|| {
        deposits::credit_deposit(
            &state.ledger,
            &state.bus,
            &prices,
            payload.user_id,
            Asset::Firma,
            amount,
            payload.tx_hash.clone(),
        )
    })
    .await?;
    Ok(Json(TxView::from(&record)))
}

async fn deposit_usdt_solana(
    State(state): State<AppState>,
    Json(payload): Json<DepositPayload>,
) -> ApiResult<TxView> {
    let amount = amount_from(payload.amount)?;
    let record = retry_once(|| {
        deposits::bridge_usdt_deposit(
            &state.ledger,
            &state.bus,
            payload.user_id,
            amount,
            payload.signature.clone(),
        )
    })
    .await?;
    Ok(Json(TxView::from(&record)))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn list_deposits(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<TxView>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let records = storage::deposits_by_user(&mut conn, user_id, limit).await?;
    Ok(Json(records.iter().map(TxView::from).collect()))
}

async fn deposit_addresses(
    State(state): State<AppState>,
    Path(_user_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    // Deposits land on platform escrow addresses, shared across users and
    // attributed by the indexer.
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let wallets = storage::escrow_wallets(&mut conn).await?;
    let ecash = wallets
        .iter()
        .find(|w| w.chain == WalletKind::Ecash)
        .map(|w| w.address.clone());
    let solana = wallets
        .iter()
        .find(|w| w.chain == WalletKind::Solana)
        .map(|w| w.address.clone());
    Ok(Json(json!({ "ecash": ecash, "solana": solana })))
}

#[derive(Deserialize)]
struct WithdrawPayload {
    user_id: i64,
    amount: f64,
}

async fn withdraw_xec(
    State(state): State<AppState>,
    Json(payload): Json<WithdrawPayload>,
) -> ApiResult<TxView> {
    let amount = amount_from(payload.amount)?;
    let prices = state.oracle.snapshot().await;
    let record = retry_once(|| {
        deposits::request_withdrawal(
            &state.ledger,
            &state.bus,
            &prices,
            payload.user_id,
            Asset::Xec,
            amount,
        )
    })
    .await?;
    Ok(Json(TxView::from(&record)))
}

async fn withdraw_firma(
    State(state): State<AppState>,
    Json(payload): Json<WithdrawPayload>,
) -> ApiResult<TxView> {
    let amount = amount_from(payload.amount)?;
    let prices = state.oracle.snapshot().await;
    let record = retry_once(|| {
        deposits::request_withdrawal(
            &state.ledger,
            &state.bus,
            &prices,
            payload.user_id,
            Asset::Firma,
            amount,
        )
    })
    .await?;
    Ok(Json(TxView::from(&record)))
}

// --- loans ---

async fn loans_config(State(state): State<AppState>) -> ApiResult<LoanConfigView> {
    let pool = state.staking.pool().await?;
    Ok(Json(LoanConfigView::new(state.engine.params(), &pool)))
}

#[derive(Deserialize)]
struct CalculatePayload {
    collateral_type: String,
    collateral_amount: f64,
    borrow_type: String,
    borrow_amount: Option<f64>,
}

async fn loans_calculate(
    State(state): State<AppState>,
    Json(payload): Json<CalculatePayload>,
) -> ApiResult<CalculateView> {
    let collateral_type = validation::parse_asset(&payload.collateral_type)?;
    let borrow_type = validation::parse_asset(&payload.borrow_type)?;
    let collateral_amount = amount_from(payload.collateral_amount)?;

    let max_borrow = state
        .engine
        .calculate_max_borrow(collateral_type, collateral_amount, borrow_type)
        .await;
    let collateral_value_usd = state.oracle.to_usd(collateral_type, collateral_amount).await;
    let ltv = match payload.borrow_amount {
        Some(raw) => {
            let borrow_amount = amount_from(raw)?;
            Some(
                state
                    .engine
                    .calculate_ltv(
                        borrow_type,
                        borrow_amount,
                        Decimal::ZERO,
                        collateral_type,
                        collateral_amount,
                    )
                    .await,
            )
        }
        None => None,
    };
    Ok(Json(CalculateView {
        max_borrow: max_borrow.to_f64().unwrap_or_default(),
        collateral_value_usd: collateral_value_usd.to_f64().unwrap_or_default(),
        ltv: ltv.and_then(|value| value.to_f64()),
    }))
}

#[derive(Deserialize)]
struct CreateLoanPayload {
    user_id: i64,
    collateral_type: String,
    collateral_amount: f64,
    borrow_type: String,
    borrow_amount: f64,
}

async fn create_loan(
    State(state): State<AppState>,
    Json(payload): Json<CreateLoanPayload>,
) -> ApiResult<LoanView> {
    let collateral_type = validation::parse_asset(&payload.collateral_type)?;
    let borrow_type = validation::parse_asset(&payload.borrow_type)?;
    let collateral_amount = amount_from(payload.collateral_amount)?;
    let borrow_amount = amount_from(payload.borrow_amount)?;
    let loan = retry_once(|| {
        state.engine.create_loan(
            payload.user_id,
            collateral_type,
            collateral_amount,
            borrow_type,
            borrow_amount,
        )
    })
    .await?;
    Ok(Json(LoanView::from(&loan)))
}

async fn loans_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<LoanView>> {
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let loans = storage::loans_by_user(&mut conn, user_id).await?;
    Ok(Json(loans.iter().map(LoanView::from).collect()))
}

async fn get_loan(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<LoanView> {
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let loan = storage::loan_by_id(&mut conn, id)
        .await?
        .ok_or(LendingError::NotFound("Loan"))?;
    Ok(Json(LoanView::from(&loan)))
}

#[derive(Deserialize)]
struct RepayPayload {
    user_id: i64,
    amount: f64,
}

async fn repay_loan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<RepayPayload>,
) -> ApiResult<RepayView> {
    let amount = amount_from(payload.amount)?;
    let outcome = retry_once(|| state.engine.repay_loan(id, payload.user_id, amount)).await?;
    Ok(Json(RepayView::from(&outcome)))
}

#[derive(Deserialize)]
struct AddCollateralPayload {
    user_id: i64,
    amount: f64,
}

async fn add_collateral(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AddCollateralPayload>,
) -> ApiResult<LoanView> {
    let amount = amount_from(payload.amount)?;
    let loan = retry_once(|| state.engine.add_collateral(id, payload.user_id, amount)).await?;
    Ok(Json(LoanView::from(&loan)))
}

// --- prices & stats ---

async fn get_prices(State(state): State<AppState>) -> ApiResult<PricesView> {
    Ok(Json(PricesView::new(state.oracle.all_prices())))
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsView> {
    let prices = state.oracle.snapshot().await;
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let users = storage::count_users(&mut conn).await?;
    let loans = storage::open_loans(&mut conn).await?;
    let pool = storage::staking_pool(&mut conn).await?;
    drop(conn);

    let mut total_collateral_usd = Decimal::ZERO;
    let mut total_borrowed_usd = Decimal::ZERO;
    for loan in &loans {
        total_collateral_usd += prices.to_usd(loan.collateral_type, loan.collateral_amount);
        total_borrowed_usd += prices.to_usd(loan.borrow_type, loan.total_debt());
    }
    Ok(Json(StatsView {
        users,
        open_loans: loans.len(),
        total_collateral_usd: total_collateral_usd.to_f64().unwrap_or_default(),
        total_borrowed_usd: total_borrowed_usd.to_f64().unwrap_or_default(),
        staking: crate::views::StakingStatsView::new(&pool, state.engine.params()),
    }))
}

// --- escrow transparency ---

async fn escrow_summary(State(state): State<AppState>) -> ApiResult<EscrowSummaryView> {
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let wallets = storage::escrow_wallets(&mut conn).await?;
    Ok(Json(EscrowSummaryView::new(&wallets)))
}

async fn escrow_wallets(State(state): State<AppState>) -> ApiResult<Vec<EscrowWalletView>> {
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let wallets = storage::escrow_wallets(&mut conn).await?;
    Ok(Json(wallets.iter().map(EscrowWalletView::from).collect()))
}

async fn escrow_transactions(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<TxView>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let records = storage::recent_txs(&mut conn, limit).await?;
    Ok(Json(records.iter().map(TxView::from).collect()))
}

async fn escrow_liquidations(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<TxView>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = state.ledger.pool().acquire().await.map_err(LendingError::from)?;
    let records = storage::liquidation_txs(&mut conn, limit).await?;
    Ok(Json(records.iter().map(TxView::from).collect()))
}
