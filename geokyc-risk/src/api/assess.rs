//! Risk query endpoints
//!
//! - `POST /assessments`: one subject → one assessment
//! - `POST /assessments/batch`: `{"subjects": [...]}` → `{"assessments": [...]}`
//!
//! Each request owns a cancellation token guarded by the handler future.
//! If the client disconnects, axum drops the future, the guard cancels the
//! token and every in-flight analyzer call for the request is told to stop.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::types::{RiskAssessment, Subject};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub assessments: Vec<RiskAssessment>,
}

/// POST /assessments
pub async fn assess_subject(
    State(state): State<AppState>,
    body: Result<Json<Subject>, JsonRejection>,
) -> ApiResult<Json<RiskAssessment>> {
    let Json(subject) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let assessment = state.scheduler.analyze_subject(&subject, &cancel).await?;
    Ok(Json(assessment))
}

/// POST /assessments/batch
pub async fn assess_batch(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<Json<BatchResponse>> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let assessments = state
        .scheduler
        .analyze_batch(request.subjects, &cancel)
        .await?;
    Ok(Json(BatchResponse { assessments }))
}

/// Build risk query routes
pub fn assessment_routes() -> Router<AppState> {
    Router::new()
        .route("/assessments", post(assess_subject))
        .route("/assessments/batch", post(assess_batch))
}
