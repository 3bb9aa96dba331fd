// HTTP handlers serving stats to the dashboard

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::{DisplayCurrency, MetricsConfig, ReportConfig};
use crate::error::ApiError;
use crate::report::{render, DataDump, StatsReport};
use crate::service::StatsService;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<StatsService>,
    pub metrics: MetricsConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub currency: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/dump", get(get_dump))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let latest = state.service.latest().await;

    Json(serde_json::json!({
        "status": "healthy",
        "stats": if latest.is_some() { "ready" } else { "pending" },
        "evaluatedAt": latest.map(|view| view.snapshot.evaluated_at),
    }))
}

/// Current stats rendered for the requested display currency
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsReport>, ApiError> {
    let mut config = state.report;
    if let Some(currency) = query.currency {
        config.display_currency = currency
            .parse::<DisplayCurrency>()
            .map_err(ApiError::BadRequest)?;
    }

    let view = state.service.latest().await.ok_or(ApiError::NotReady)?;
    info!("Serving stats evaluated at {}", view.snapshot.evaluated_at);

    Ok(Json(render(&view, &state.metrics, &config)))
}

/// Raw fetched collections
pub async fn get_dump(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let view = state.service.latest().await.ok_or(ApiError::NotReady)?;
    Ok(Json(DataDump::from(view.as_ref())).into_response())
}
