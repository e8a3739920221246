//! Per-subject orchestrator
//!
//! One run owns its evidence collection outright: adapter tasks return
//! evidence by value and nothing is shared with other runs except the
//! per-source quotas inside the adapters.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{PipelineEvent, PipelineState};
use crate::analyzers::AnalyzerSet;
use crate::audit::AuditSink;
use crate::config::PipelineConfig;
use crate::error::{RiskError, RiskResult};
use crate::fusion::FusionEngine;
use crate::types::{Evidence, RiskAssessment, Source, Subject};

pub struct Orchestrator {
    analyzers: AnalyzerSet,
    engine: Arc<FusionEngine>,
    audit: Arc<dyn AuditSink>,
    deadline: Duration,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(
        analyzers: AnalyzerSet,
        engine: Arc<FusionEngine>,
        audit: Arc<dyn AuditSink>,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            analyzers,
            engine,
            audit,
            deadline: pipeline.deadline(),
            event_tx: None,
        }
    }

    /// Publish progress events on `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Analyze one subject
    ///
    /// Fails only for an invalid subject or caller cancellation; analyzer
    /// failures end up in the evidence and the assessment's confidence.
    pub async fn analyze(
        &self,
        subject: &Subject,
        cancel: &CancellationToken,
    ) -> RiskResult<RiskAssessment> {
        subject.validate()?;

        let run_id = Uuid::new_v4();
        let span = info_span!("assessment", subject = %subject.subject_ref(), run_id = %run_id);
        self.run(subject, run_id, cancel).instrument(span).await
    }

    async fn run(
        &self,
        subject: &Subject,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> RiskResult<RiskAssessment> {
        let subject_ref = subject.subject_ref();
        let started = Instant::now();
        let deadline = started + self.deadline;

        self.transition(run_id, subject_ref, PipelineState::Pending);
        if cancel.is_cancelled() {
            return Err(RiskError::Cancelled);
        }

        // Dropping this run (or returning early) cancels its adapter calls
        let collect_token = cancel.child_token();
        let _collect_guard = collect_token.clone().drop_guard();

        self.transition(run_id, subject_ref, PipelineState::Collecting);

        let shared_subject = Arc::new(subject.clone());
        let mut pending = FuturesUnordered::new();
        for adapter in self.analyzers.iter() {
            let adapter = Arc::clone(adapter);
            let subject = Arc::clone(&shared_subject);
            let token = collect_token.clone();
            let source = adapter.source();
            let handle = tokio::spawn(
                async move { adapter.fetch(&subject, deadline, &token).await }.in_current_span(),
            );
            pending.push(async move { (source, handle.await) });
        }

        let mut collected: BTreeMap<Source, Evidence> = BTreeMap::new();
        let mut timed_out = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Assessment cancelled while collecting evidence");
                    return Err(RiskError::Cancelled);
                }
                next = pending.next() => match next {
                    Some((source, Ok(evidence))) => {
                        self.emit_event(PipelineEvent::SourceCompleted {
                            run_id,
                            subject_ref: subject_ref.to_string(),
                            source,
                            status: evidence.status,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                        collected.insert(source, evidence);
                    }
                    Some((source, Err(join_err))) => {
                        error!(source = %source, error = %join_err, "Analyzer task aborted");
                        collected.insert(
                            source,
                            Evidence::failed(source, subject_ref, Utc::now(), format!("analyzer task aborted: {}", join_err)),
                        );
                    }
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
        }

        // Stragglers get the signal but are not awaited
        collect_token.cancel();
        drop(pending);

        if timed_out {
            warn!(
                collected = collected.len(),
                expected = Source::ALL.len(),
                "Pipeline deadline elapsed with analyzers still running"
            );
            self.transition(run_id, subject_ref, PipelineState::TimedOut);
        }

        let now = Utc::now();
        for source in Source::ALL {
            collected.entry(source).or_insert_with(|| {
                Evidence::missing(source, subject_ref, now, "no result before the pipeline deadline")
            });
        }

        let partial = collected.values().any(|e| !e.is_usable());
        self.transition(run_id, subject_ref, PipelineState::Fusing { partial });

        let assessment = self
            .engine
            .assess(subject, collected.into_values().collect());

        if let Err(e) = self.audit.record(&assessment).await {
            error!(error = %e, "Failed to hand assessment to audit sink");
        }

        self.transition(run_id, subject_ref, PipelineState::Complete);
        self.emit_event(PipelineEvent::AssessmentReady {
            run_id,
            subject_ref: subject_ref.to_string(),
            risk_level: assessment.risk_level(),
            recommendation: assessment.recommendation(),
            overall_score: assessment.overall_score(),
        });

        info!(
            level = %assessment.risk_level(),
            recommendation = %assessment.recommendation(),
            score = assessment.overall_score(),
            confidence = assessment.confidence(),
            conflicting = assessment.conflicting(),
            partial,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assessment complete"
        );

        Ok(assessment)
    }

    fn transition(&self, run_id: Uuid, subject_ref: &str, state: PipelineState) {
        debug!(state = ?state, "Pipeline state");
        self.emit_event(PipelineEvent::StateChanged {
            run_id,
            subject_ref: subject_ref.to_string(),
            state,
        });
    }

    /// Emit pipeline event if channel configured. Never waits on the
    /// consumer: a full channel drops the event so the deadline still fires.
    fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            match tx.try_send(event) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!(event = ?dropped, "Event channel full, dropping pipeline event");
                }
            }
        }
    }
}
