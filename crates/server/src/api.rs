//! HTTP API consumed by the dashboard front end

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use engine::{
    equity_curve_csv, parse_analysis, parse_external_backtest, BacktestComparison, BacktestConfig,
    BacktestEngine, BacktestReport, BoundaryError, ExportError, MarketOrder, SessionError,
    SessionId, SessionRegistry, SimError,
};
use persistence::repository::SettingsRepository;
use persistence::{Database, DbError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::APP_VERSION;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: Arc<SessionRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api_health))
        .route("/backtest", post(api_backtest))
        .route("/backtest/compare", post(api_compare))
        .route("/backtest/equity.csv", get(api_equity_csv))
        .route("/backtest/validate", post(api_validate_backtest))
        .route("/analysis/validate", post(api_validate_analysis))
        .route("/settings", get(api_list_settings))
        .route(
            "/settings/:key",
            get(api_get_setting)
                .put(api_put_setting)
                .delete(api_delete_setting),
        )
        .route("/sessions", post(api_create_session))
        .route(
            "/sessions/:id",
            get(api_get_session).delete(api_close_session),
        )
        .route("/sessions/:id/orders", post(api_session_order))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by a handler, rendered as `{success: false, error, kind}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(kind = self.kind, "{}", self.message);
        }
        let body = serde_json::json!({
            "success": false,
            "error": self.message,
            "kind": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<SimError> for ApiError {
    fn from(e: SimError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.kind(), e.to_string())
    }
}

impl From<BoundaryError> for ApiError {
    fn from(e: BoundaryError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.kind(), e.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match e {
            SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::InvalidKey(_) => Self::new(StatusCode::BAD_REQUEST, "invalid_key", e.to_string()),
            other => Self::internal(format!("Database error: {}", other)),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        Self::internal(format!("Export failed: {}", e))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("Backtest task failed: {}", e))
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Backtests
// ============================================================================

/// Run one backtest off the async runtime
pub async fn run_backtest(config: BacktestConfig) -> ApiResult<BacktestReport> {
    let report = tokio::task::spawn_blocking(move || BacktestEngine::run(&config)).await??;
    Ok(report)
}

/// Run both configurations concurrently; neither run sees the other's data
pub async fn run_comparison(
    original: BacktestConfig,
    enhanced: BacktestConfig,
) -> ApiResult<BacktestComparison> {
    let (original, enhanced) = tokio::join!(run_backtest(original), run_backtest(enhanced));
    Ok(BacktestComparison::new(original?, enhanced?))
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "botdash",
        "version": APP_VERSION,
    }))
}

/// POST /api/backtest — run the synthetic MACD backtest
async fn api_backtest(Json(config): Json<BacktestConfig>) -> ApiResult<Json<serde_json::Value>> {
    info!(seed = config.seed, bars = config.length, "Backtest requested");
    let report = run_backtest(config).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "config_hash": report.config_hash,
        "summary": report.summary,
        "equity_curve": report.equity_curve,
    })))
}

#[derive(Debug, Deserialize)]
struct CompareRequest {
    #[serde(default)]
    original: BacktestConfig,
    #[serde(default)]
    enhanced: BacktestConfig,
}

/// POST /api/backtest/compare — original vs enhanced configuration
async fn api_compare(Json(request): Json<CompareRequest>) -> ApiResult<Json<serde_json::Value>> {
    let comparison = run_comparison(request.original, request.enhanced).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "comparison": comparison,
    })))
}

/// GET /api/backtest/equity.csv — equity curve as CSV
async fn api_equity_csv(Query(config): Query<BacktestConfig>) -> ApiResult<Response> {
    let report = run_backtest(config).await?;
    let csv = equity_curve_csv(&report.equity_curve)?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    )
        .into_response())
}

fn body_text(body: &Bytes) -> ApiResult<&str> {
    std::str::from_utf8(body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "malformed_json", "body is not UTF-8"))
}

/// POST /api/backtest/validate — check an externally produced backtest
async fn api_validate_backtest(body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let backtest = parse_external_backtest(body_text(&body)?).map_err(|e| {
        warn!(error = %e, "Rejected external backtest");
        e
    })?;
    Ok(Json(serde_json::json!({
        "success": true,
        "summary": backtest.summary,
        "equity_curve": backtest.equity_curve,
    })))
}

/// POST /api/analysis/validate — check an AI code analysis response
async fn api_validate_analysis(body: Bytes) -> ApiResult<Json<serde_json::Value>> {
    let analysis = parse_analysis(body_text(&body)?).map_err(|e| {
        warn!(error = %e, "Rejected analysis response");
        e
    })?;
    Ok(Json(serde_json::json!({
        "success": true,
        "analysis": analysis,
    })))
}

// ============================================================================
// Settings
// ============================================================================

/// GET /api/settings
async fn api_list_settings(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let records = SettingsRepository::new(state.db.pool()).list().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": records,
        "total": records.len(),
    })))
}

/// GET /api/settings/:key
async fn api_get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    match SettingsRepository::new(state.db.pool()).get(&key).await? {
        Some(record) => Ok(Json(serde_json::json!({
            "success": true,
            "data": record,
        }))),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_setting",
            format!("No setting named {:?}", key),
        )),
    }
}

/// PUT /api/settings/:key — body is any JSON value, stored as its text
async fn api_put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = SettingsRepository::new(state.db.pool())
        .set(&key, &value.to_string())
        .await?;
    info!(key = %key, "Setting saved");
    Ok(Json(serde_json::json!({
        "success": true,
        "data": record,
    })))
}

/// DELETE /api/settings/:key
async fn api_delete_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = SettingsRepository::new(state.db.pool()).delete(&key).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "removed": removed,
    })))
}

// ============================================================================
// Simulated exchange sessions
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    initial_balance: Option<Decimal>,
}

/// POST /api/sessions
async fn api_create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.sessions.create(request.initial_balance)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "session": session,
    })))
}

/// GET /api/sessions/:id
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = state.sessions.get(id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "session": session,
    })))
}

/// DELETE /api/sessions/:id
async fn api_close_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<serde_json::Value>> {
    state.sessions.close(id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/sessions/:id/orders — simulated market fill
async fn api_session_order(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Json(order): Json<MarketOrder>,
) -> ApiResult<Json<serde_json::Value>> {
    let fill = state.sessions.apply_fill(id, &order)?;
    let session = state.sessions.get(id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "fill": fill,
        "balances": session.balances(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_error_maps_to_bad_request() {
        let err: ApiError = SimError::DivisionByZero { bar: 3 }.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "division_by_zero");
    }

    #[test]
    fn test_unknown_session_maps_to_not_found() {
        let err: ApiError = SessionError::UnknownSession(9).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_schema_error_kind() {
        let err: ApiError = BoundaryError::NoJson.into();
        assert_eq!(err.kind, "no_json");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_comparison_runs_both_configs() {
        let original = BacktestConfig {
            length: 100,
            ..Default::default()
        };
        let enhanced = BacktestConfig {
            length: 100,
            fast_period: 5,
            slow_period: 13,
            ..Default::default()
        };
        let cmp = run_comparison(original, enhanced).await.unwrap();
        assert_eq!(cmp.original.equity_curve.len(), 100);
        assert_eq!(cmp.enhanced.equity_curve.len(), 100);
        assert_ne!(cmp.original.config_hash, cmp.enhanced.config_hash);
    }

    #[tokio::test]
    async fn test_session_order_flow() {
        use rust_decimal_macros::dec;

        let state = AppState {
            db: Arc::new(Database::in_memory().await.unwrap()),
            sessions: Arc::new(SessionRegistry::new()),
        };
        let session = state.sessions.create(Some(dec!(1000))).unwrap();

        let order = MarketOrder {
            symbol: "ETH/USDT".to_string(),
            side: engine::OrderSide::Buy,
            quantity: dec!(0.5),
            price: dec!(1500),
        };
        let Json(body) = api_session_order(State(state.clone()), Path(session.id), Json(order))
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(state.sessions.get(session.id).unwrap().balance("USDT"), dec!(250));

        let err = api_get_session(State(state), Path(session.id + 1))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_handlers() {
        let state = AppState {
            db: Arc::new(Database::in_memory().await.unwrap()),
            sessions: Arc::new(SessionRegistry::new()),
        };

        api_put_setting(
            State(state.clone()),
            Path("sound".to_string()),
            Json(serde_json::json!({"enabled": true})),
        )
        .await
        .unwrap();

        let Json(body) = api_get_setting(State(state.clone()), Path("sound".to_string()))
            .await
            .unwrap();
        assert_eq!(body["data"]["value"], r#"{"enabled":true}"#);

        let err = api_get_setting(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let err = run_backtest(BacktestConfig {
            initial_capital: -1.0,
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, "invalid_parameter");
    }
}
