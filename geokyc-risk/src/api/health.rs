//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::fusion::RULESET_VERSION;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("geokyc-risk")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Rule-table version stamped on assessments
    pub ruleset_version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Analyzer outputs are synthetic
    pub demo_mode: bool,
    /// Largest batch `POST /assessments/batch` admits
    pub max_batch_size: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "geokyc-risk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ruleset_version: RULESET_VERSION.to_string(),
        uptime_seconds,
        demo_mode: state.demo_mode,
        max_batch_size: state.scheduler.max_batch_size(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
