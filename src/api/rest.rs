// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Queries are public GETs. Commands are
// POSTs signed by the caller (see `api::auth`); the authenticated identity is
// handed to the ledger, which decides whether that identity may act.
//
// Errors are returned as `{ "error": <code>, "message": ..., "retryable": .. }`.
//
// CORS is configured permissively; put the service behind a gateway in
// production.
// =============================================================================

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Json, Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::auth::{authenticate, AuthError};
use crate::app_state::AppState;
use crate::ledger::{
    Configuration, DynamicStopLossConfig, InitializeRequest, LedgerError, PerformanceUpdate,
    PortfolioSnapshot, RiskLimits, RiskMetrics, SignalEntry, SignalRequest, SnapshotRequest,
    StopLossRequest, StrategyPerformance, TradeRecord, TradeRequest,
};
use crate::types::Identity;

/// Page size when `limit` is not given.
const DEFAULT_PAGE: usize = 100;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Identity & configuration ────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/initialize", post(initialize))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/operational", get(operational))
        .route("/api/v1/risk-limits", post(update_risk_limits))
        .route("/api/v1/max-single-trade", post(set_max_single_trade))
        .route("/api/v1/halt", post(emergency_halt))
        .route("/api/v1/resume", post(resume_operations))
        // ── Risk & signals ──────────────────────────────────────────
        .route("/api/v1/risk/validate", post(validate_risk))
        .route("/api/v1/risk/metrics", get(risk_metrics))
        .route("/api/v1/signals", post(submit_signal))
        .route("/api/v1/signals/:id", get(get_signal))
        .route("/api/v1/signals/:id/approve", post(approve_signal))
        // ── Trades ──────────────────────────────────────────────────
        .route("/api/v1/trades", post(record_trade).get(list_trades))
        .route("/api/v1/trades/:id", get(get_trade))
        .route("/api/v1/trade-count", get(trade_count))
        // ── Strategy performance ────────────────────────────────────
        .route("/api/v1/strategies/:name/performance", post(update_performance))
        .route("/api/v1/strategies/:name", get(get_performance))
        // ── Snapshots ───────────────────────────────────────────────
        .route("/api/v1/snapshots", post(create_snapshot).get(list_snapshots))
        .route("/api/v1/snapshots/latest", get(latest_snapshot))
        .route("/api/v1/snapshots/:id", get(get_snapshot))
        // ── Dynamic stop-loss ───────────────────────────────────────
        .route("/api/v1/stop-loss/:asset", post(set_stop_loss).get(get_stop_loss))
        // ── Middleware & State ──────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

pub enum ApiError {
    Ledger(LedgerError),
    Auth(AuthError),
    BadRequest(String),
    Forbidden(&'static str),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

fn status_of(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        LedgerError::AlreadyInitialized
        | LedgerError::NotInitialized
        | LedgerError::InvalidTransition { .. }
        | LedgerError::SignalNotApproved { .. }
        | LedgerError::SignalMismatch { .. } => StatusCode::CONFLICT,
        LedgerError::SystemHalted => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::InvalidIdentities(_)
        | LedgerError::InvalidRiskLimits(_)
        | LedgerError::InvalidAmount(_)
        | LedgerError::InvalidSignal(_) => StatusCode::BAD_REQUEST,
        LedgerError::TradeLimitExceeded { .. } | LedgerError::Overflow(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retryable) = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Ledger(e) => (status_of(&e), e.code(), e.to_string(), e.is_retryable()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, false),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "UNAUTHORIZED", msg.to_string(), false),
        };
        let body = serde_json::json!({
            "error": code,
            "message": message,
            "retryable": retryable,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Command plumbing
// =============================================================================

/// Authenticate a signed POST and return the caller.
fn caller(state: &AppState, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Result<Identity, ApiError> {
    Ok(authenticate(state, &Method::POST, uri.path(), headers, body)?)
}

fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// Bump the state version after a committed command.
fn committed<T>(state: &AppState, value: T) -> ApiResult<T> {
    state.increment_version();
    Ok(Json(value))
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
}

const ACK: Ack = Ack { ok: true };

#[derive(Debug, Deserialize)]
struct PageParams {
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    limit: Option<usize>,
}

impl PageParams {
    fn resolve(&self) -> (u64, usize) {
        (self.start.unwrap_or(1), self.limit.unwrap_or(DEFAULT_PAGE))
    }
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    operational: bool,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        operational: state.ledger.is_operational(),
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Identity & configuration / halt switch
// =============================================================================

async fn initialize(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: InitializeRequest = parse(&body)?;
    if caller != req.admin {
        warn!(caller = %caller, admin = %req.admin, "initialize not signed by the declared admin");
        return Err(ApiError::Forbidden("initialize must be signed by the declared admin"));
    }
    state.ledger.initialize(req)?;
    committed(&state, ACK)
}

async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Configuration> {
    Ok(Json(state.ledger.get_config()?))
}

async fn operational(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "operational": state.ledger.is_operational() }))
}

async fn update_risk_limits(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let limits: RiskLimits = parse(&body)?;
    state.ledger.update_risk_limits(&caller, limits)?;
    committed(&state, ACK)
}

#[derive(Deserialize)]
struct MaxSingleTradeBody {
    max_single_trade: i128,
}

async fn set_max_single_trade(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: MaxSingleTradeBody = parse(&body)?;
    state.ledger.set_max_single_trade(&caller, req.max_single_trade)?;
    committed(&state, ACK)
}

async fn emergency_halt(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    state.ledger.emergency_halt(&caller)?;
    committed(&state, ACK)
}

async fn resume_operations(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    state.ledger.resume_operations(&caller)?;
    committed(&state, ACK)
}

// =============================================================================
// Risk & signals
// =============================================================================

#[derive(Deserialize)]
struct ValidateBody {
    var_95: i32,
    sharpe_ratio: i32,
    max_drawdown: i32,
}

/// Public: no signing headers, but the body still goes through `parse` so a
/// malformed request gets the usual error body.
async fn validate_risk(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let req: ValidateBody = parse(&body)?;
    let valid = state
        .ledger
        .validate_risk_metrics(req.var_95, req.sharpe_ratio, req.max_drawdown);
    Ok(Json(serde_json::json!({ "valid": valid })))
}

async fn risk_metrics(State(state): State<Arc<AppState>>) -> ApiResult<RiskMetrics> {
    Ok(Json(state.ledger.get_risk_metrics()))
}

async fn submit_signal(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: SignalRequest = parse(&body)?;
    let signal_id = state.ledger.submit_signal(&caller, req)?;
    committed(&state, serde_json::json!({ "signal_id": signal_id }))
}

async fn get_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<SignalEntry> {
    Ok(Json(state.ledger.get_signal(id)?))
}

async fn approve_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let metrics: RiskMetrics = parse(&body)?;
    let status = state.ledger.approve_signal(&caller, id, metrics)?;
    committed(&state, serde_json::json!({ "signal_id": id, "status": status }))
}

// =============================================================================
// Trades
// =============================================================================

async fn record_trade(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: TradeRequest = parse(&body)?;
    let trade_id = state.ledger.record_trade(&caller, req)?;
    committed(&state, serde_json::json!({ "trade_id": trade_id }))
}

async fn get_trade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<TradeRecord> {
    Ok(Json(state.ledger.get_trade(id)?))
}

async fn list_trades(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> ApiResult<Vec<TradeRecord>> {
    let (start, limit) = page.resolve();
    Ok(Json(state.ledger.list_trades(start, limit)))
}

async fn trade_count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "total_trades": state.ledger.get_total_trades() }))
}

// =============================================================================
// Strategy performance
// =============================================================================

async fn update_performance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StrategyPerformance> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let update: PerformanceUpdate = parse(&body)?;
    let performance = state
        .ledger
        .update_strategy_performance(&caller, &name, update)?;
    committed(&state, performance)
}

async fn get_performance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<StrategyPerformance> {
    Ok(Json(state.ledger.get_strategy_performance(&name)?))
}

// =============================================================================
// Snapshots
// =============================================================================

async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<serde_json::Value> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: SnapshotRequest = parse(&body)?;
    let snapshot_id = state.ledger.create_snapshot(&caller, req)?;
    committed(&state, serde_json::json!({ "snapshot_id": snapshot_id }))
}

async fn latest_snapshot(
    State(state): State<Arc<AppState>>,
) -> ApiResult<PortfolioSnapshot> {
    Ok(Json(state.ledger.get_latest_snapshot()?))
}

async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<PortfolioSnapshot> {
    Ok(Json(state.ledger.get_snapshot(id)?))
}

async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> ApiResult<Vec<PortfolioSnapshot>> {
    let (start, limit) = page.resolve();
    Ok(Json(state.ledger.list_snapshots(start, limit)))
}

// =============================================================================
// Dynamic stop-loss
// =============================================================================

async fn set_stop_loss(
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Ack> {
    let caller = caller(&state, &uri, &headers, &body)?;
    let req: StopLossRequest = parse(&body)?;
    state.ledger.set_dynamic_stop_loss(&caller, &asset, req)?;
    committed(&state, ACK)
}

async fn get_stop_loss(
    State(state): State<Arc<AppState>>,
    Path(asset): Path<String>,
) -> ApiResult<DynamicStopLossConfig> {
    Ok(Json(state.ledger.get_dynamic_stop_loss_config(&asset)?))
}
