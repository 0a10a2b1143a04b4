use super::error::ApiError;
use crate::application::service::{GateService, GateStatus, ProfitSummary};
use crate::domain::balance::BalanceObservation;
use crate::domain::policy::VerificationResult;
use crate::domain::profit::{NewProfitReport, ProfitReport};
use crate::domain::worker::WorkerHandle;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GateService>,
    pub api_key: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub wallet: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub message: &'static str,
    pub worker: WorkerHandle,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub online: bool,
    #[serde(flatten)]
    pub status: GateStatus,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub observations: Vec<BalanceObservation>,
}

/// Builds the service router.
///
/// When `api_key` is set every route, `/status` included, requires a
/// matching `x-api-key` header.
pub fn router(service: Arc<GateService>, api_key: Option<String>) -> Router {
    let state = AppState {
        service,
        api_key: api_key.map(Arc::from),
    };
    Router::new()
        .route("/status", get(status))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/api/balances", get(balances))
        .route("/api/verify", get(verify))
        .route("/api/profits", get(list_profits).post(report_profit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_ref()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        online: true,
        status: state.service.status().await,
    })
}

async fn start(
    State(state): State<AppState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(body) = body.map_err(ApiError::InvalidBody)?;
    let wallet = body
        .wallet
        .filter(|w| !w.trim().is_empty())
        .ok_or(ApiError::MissingField("wallet address"))?;
    let worker = state.service.start(&wallet).await?;
    Ok(Json(StartResponse {
        success: true,
        message: "Worker started",
        worker,
    }))
}

async fn stop(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    state.service.stop("http").await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Stop signaled",
    }))
}

async fn balances(State(state): State<AppState>) -> Result<Json<BalancesResponse>, ApiError> {
    let observations = state.service.observe().await?;
    Ok(Json(BalancesResponse { observations }))
}

async fn verify(State(state): State<AppState>) -> Result<Json<VerificationResult>, ApiError> {
    Ok(Json(state.service.verify().await?))
}

async fn list_profits(State(state): State<AppState>) -> Result<Json<ProfitSummary>, ApiError> {
    Ok(Json(state.service.profits().await?))
}

async fn report_profit(
    State(state): State<AppState>,
    report: Result<Json<NewProfitReport>, JsonRejection>,
) -> Result<Json<ProfitReport>, ApiError> {
    let Json(report) = report.map_err(ApiError::InvalidReport)?;
    Ok(Json(state.service.report_profit(report).await?))
}
