//! geokyc-risk library interface
//!
//! Evidence fusion and risk decision engine for business onboarding,
//! plus the orchestration that drives the external analyzers.

pub mod analyzers;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod fusion;
pub mod normalizer;
pub mod types;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, RiskError, RiskResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::analyzers::{AnalyzerClient, AnalyzerSet};
use crate::audit::AuditSink;
use crate::config::EngineConfig;
use crate::fusion::FusionEngine;
use crate::workflow::{BatchScheduler, Orchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Runs single and batch assessments under the global ceiling
    pub scheduler: Arc<BatchScheduler>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    pub demo_mode: bool,
}

impl AppState {
    pub fn new(scheduler: Arc<BatchScheduler>, demo_mode: bool) -> Self {
        Self {
            scheduler,
            startup_time: Utc::now(),
            demo_mode,
        }
    }
}

/// Wire analyzers, fusion engine, orchestrator and scheduler from config
pub fn build_scheduler(
    config: &EngineConfig,
    clients: Vec<Arc<dyn AnalyzerClient>>,
    audit: Arc<dyn AuditSink>,
) -> RiskResult<BatchScheduler> {
    let analyzers = AnalyzerSet::from_config(config, clients)?;
    let engine = Arc::new(FusionEngine::new(config.fusion.clone())?);
    let orchestrator = Orchestrator::new(analyzers, engine, audit, &config.pipeline);
    Ok(BatchScheduler::new(Arc::new(orchestrator), &config.batch))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::assessment_routes())
        .merge(api::health_routes())
        .with_state(state)
}
