//! Per-subject pipeline and batch scheduling
//!
//! - [`orchestrator::Orchestrator`]: fans out one call per analyzer,
//!   collects evidence until done or deadline, fuses, audits
//! - [`batch::BatchScheduler`]: admission control, global concurrency
//!   ceiling, order-preserving batch results
//!
//! Run state machine:
//! `Pending → Collecting → Fusing → Complete`, or
//! `Pending → Collecting → TimedOut → Fusing(partial) → Complete`.

pub mod batch;
pub mod orchestrator;

use serde::Serialize;
use uuid::Uuid;

use crate::types::{EvidenceStatus, Recommendation, RiskLevel, Source};

pub use batch::BatchScheduler;
pub use orchestrator::Orchestrator;

/// Orchestrator run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Collecting,
    /// Overall deadline elapsed with adapters still running
    TimedOut,
    /// `partial` when any source is Missing or Failed
    Fusing { partial: bool },
    Complete,
}

/// Progress events published by the orchestrator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    StateChanged {
        run_id: Uuid,
        subject_ref: String,
        state: PipelineState,
    },

    /// One analyzer finished (any status)
    SourceCompleted {
        run_id: Uuid,
        subject_ref: String,
        source: Source,
        status: EvidenceStatus,
        elapsed_ms: u64,
    },

    AssessmentReady {
        run_id: Uuid,
        subject_ref: String,
        risk_level: RiskLevel,
        recommendation: Recommendation,
        overall_score: f64,
    },
}
