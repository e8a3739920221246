//! Batch scheduler
//!
//! Admission is all-or-nothing: an oversized batch or any invalid subject
//! rejects the whole request before a single orchestrator starts. Admitted
//! batches run through `futures::stream::buffered`, which keeps results
//! in input order whatever order runs complete in.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::Orchestrator;
use crate::config::BatchConfig;
use crate::error::{RiskError, RiskResult};
use crate::types::{RiskAssessment, Subject};

pub struct BatchScheduler {
    orchestrator: Arc<Orchestrator>,
    max_batch_size: usize,
    global_concurrency: usize,
    /// Global ceiling on subjects in flight, shared by every request
    global: Arc<Semaphore>,
}

impl BatchScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &BatchConfig) -> Self {
        Self {
            orchestrator,
            max_batch_size: config.max_batch_size,
            global_concurrency: config.global_concurrency,
            global: Arc::new(Semaphore::new(config.global_concurrency)),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Subjects that could start right now
    pub fn available_slots(&self) -> usize {
        self.global.available_permits()
    }

    /// Analyze one subject under the global ceiling
    pub async fn analyze_subject(
        &self,
        subject: &Subject,
        cancel: &CancellationToken,
    ) -> RiskResult<RiskAssessment> {
        subject.validate()?;
        self.run_one(subject, cancel).await
    }

    /// Analyze a batch; results are in input order
    pub async fn analyze_batch(
        &self,
        subjects: Vec<Subject>,
        cancel: &CancellationToken,
    ) -> RiskResult<Vec<RiskAssessment>> {
        if subjects.len() > self.max_batch_size {
            warn!(
                requested = subjects.len(),
                max = self.max_batch_size,
                "Batch rejected: too many subjects"
            );
            return Err(RiskError::BatchAdmissionRejected {
                requested: subjects.len(),
                max: self.max_batch_size,
            });
        }

        for (index, subject) in subjects.iter().enumerate() {
            subject.validate().map_err(|e| match e {
                RiskError::InvalidSubject(msg) => {
                    RiskError::InvalidSubject(format!("subject {}: {}", index, msg))
                }
                other => other,
            })?;
        }

        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let batch_id = Uuid::new_v4();
        info!(batch = %batch_id, size = subjects.len(), "Batch admitted");

        // Each run owns its subject so the batch future stays Send for handlers.
        // First error (cancellation) drops every run still in flight.
        let assessments: Vec<RiskAssessment> = stream::iter(subjects)
            .map(|subject| async move { self.run_one(&subject, cancel).await })
            .buffered(self.global_concurrency)
            .try_collect()
            .await?;

        info!(batch = %batch_id, size = assessments.len(), "Batch complete");
        Ok(assessments)
    }

    async fn run_one(
        &self,
        subject: &Subject,
        cancel: &CancellationToken,
    ) -> RiskResult<RiskAssessment> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RiskError::Cancelled),
            permit = self.global.acquire() => permit.map_err(|_| RiskError::Cancelled)?,
        };

        self.orchestrator.analyze(subject, cancel).await
    }
}
