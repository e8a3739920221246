//! Audit sinks
//!
//! Every completed assessment is handed to an [`AuditSink`] verbatim,
//! evidence snapshot and contributions included. Sinks decide nothing about
//! retention; the JSON-lines writer only ever appends.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::types::RiskAssessment;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit channel closed")]
    Closed,

    #[error("Failed to serialize assessment: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Audit IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, assessment: &RiskAssessment) -> Result<(), AuditError>;
}

/// Logs each assessment as JSON on the `audit` target
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, assessment: &RiskAssessment) -> Result<(), AuditError> {
        let json = serde_json::to_string(assessment)?;
        info!(
            target: "audit",
            subject = %assessment.subject_ref(),
            level = %assessment.risk_level(),
            assessment = %json,
            "Assessment recorded"
        );
        Ok(())
    }
}

/// Forwards assessments to a channel (collector task, tests)
pub struct ChannelAuditSink {
    tx: mpsc::Sender<RiskAssessment>,
}

impl ChannelAuditSink {
    pub fn new(tx: mpsc::Sender<RiskAssessment>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn record(&self, assessment: &RiskAssessment) -> Result<(), AuditError> {
        self.tx
            .send(assessment.clone())
            .await
            .map_err(|_| AuditError::Closed)
    }
}

/// Append every assessment received on `rx` to `path` as one JSON line
///
/// Runs until the channel closes. A write failure stops the task and is
/// returned through the handle.
pub fn spawn_json_lines_writer(
    path: PathBuf,
    mut rx: mpsc::Receiver<RiskAssessment>,
) -> JoinHandle<Result<(), AuditError>> {
    tokio::spawn(async move {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to open audit log");
                AuditError::Io(e)
            })?;

        info!(path = %path.display(), "Audit log writer started");

        while let Some(assessment) = rx.recv().await {
            let mut line = serde_json::to_vec(&assessment)?;
            line.push(b'\n');
            file.write_all(&line).await?;
            file.flush().await?;
        }

        info!(path = %path.display(), "Audit log writer stopped");
        Ok(())
    })
}
