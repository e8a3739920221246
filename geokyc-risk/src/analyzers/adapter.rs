//! Analyzer adapter: timeout, retry and quota around one client
//!
//! `fetch` never returns an error. Every outcome becomes evidence:
//! - answer normalized → Ok / Degraded
//! - no answer before the pipeline deadline, or cancelled → Missing
//! - permanent error, retries exhausted, or unusable output → Failed
//!
//! **Backoff Strategy:**
//! - Initial delay: `initial_backoff_ms` from the source policy
//! - Max delay: 1000ms
//! - Multiplier: 2.0 (exponential)
//! - Never sleeps past the pipeline deadline

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{AnalyzerClient, AnalyzerError};
use crate::config::{EngineConfig, SourcePolicy};
use crate::error::{RiskError, RiskResult};
use crate::normalizer::Normalizer;
use crate::types::{Evidence, Source, Subject};

const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// One source's client wrapped with its call policy and shared quota
pub struct AnalyzerAdapter {
    source: Source,
    client: Arc<dyn AnalyzerClient>,
    policy: SourcePolicy,
    /// Per-source in-flight limit, shared by every run using this adapter
    quota: Arc<Semaphore>,
    normalizer: Normalizer,
}

impl AnalyzerAdapter {
    pub fn new(client: Arc<dyn AnalyzerClient>, policy: SourcePolicy, normalizer: Normalizer) -> Self {
        let quota = Arc::new(Semaphore::new(policy.max_concurrency));
        Self {
            source: client.source(),
            client,
            policy,
            quota,
            normalizer,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Quota permits currently free
    pub fn available_quota(&self) -> usize {
        self.quota.available_permits()
    }

    /// Fetch evidence for a subject, bounded by `deadline`
    pub async fn fetch(
        &self,
        subject: &Subject,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Evidence {
        let subject_ref = subject.subject_ref();
        let started = Instant::now();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return self.missing(subject_ref, "cancelled before source quota was granted");
            }
            _ = sleep_until(deadline) => {
                return self.missing(subject_ref, "deadline elapsed waiting for source quota");
            }
            permit = self.quota.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.failed(subject_ref, "source quota closed"),
            },
        };

        let mut backoff = self.policy.initial_backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let now = Instant::now();
            if now >= deadline {
                return self.missing(subject_ref, "deadline elapsed before the call was made");
            }
            let call_deadline = (now + self.policy.timeout()).min(deadline);
            let budget = call_deadline - now;

            if attempt > 1 {
                debug!(subject = %subject_ref, source = %self.source, attempt, "Retrying analyzer call");
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.missing(subject_ref, "cancelled while the call was in flight");
                }
                result = timeout_at(call_deadline, self.client.fetch(subject, budget)) => result,
            };

            let err = match outcome {
                Ok(Ok(raw)) => {
                    let fetched_at = Utc::now();
                    return match self.normalizer.normalize(self.source, subject_ref, raw, fetched_at) {
                        Ok(evidence) => {
                            debug!(
                                subject = %subject_ref,
                                source = %self.source,
                                attempt,
                                status = %evidence.status,
                                confidence = evidence.confidence,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Analyzer call succeeded"
                            );
                            evidence
                        }
                        Err(e) => {
                            error!(subject = %subject_ref, source = %self.source, error = %e, "Analyzer output rejected");
                            Evidence::failed(self.source, subject_ref, fetched_at, e.to_string())
                        }
                    };
                }
                Ok(Err(err)) => err,
                Err(_) if call_deadline >= deadline => {
                    return self.missing(subject_ref, "no answer before the pipeline deadline");
                }
                Err(_) => AnalyzerError::Timeout,
            };

            if !err.is_transient() {
                error!(subject = %subject_ref, source = %self.source, attempt, error = %err, "Analyzer call failed permanently");
                return self.failed(subject_ref, err.to_string());
            }

            if attempt > self.policy.max_retries {
                error!(
                    subject = %subject_ref,
                    source = %self.source,
                    attempt,
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analyzer retries exhausted"
                );
                return self.failed(
                    subject_ref,
                    format!("{} (after {} attempts)", err, attempt),
                );
            }

            let wake = Instant::now() + backoff;
            if wake >= deadline {
                warn!(subject = %subject_ref, source = %self.source, attempt, error = %err, "No time left to retry before the deadline");
                return self.failed(subject_ref, format!("{} (no time left to retry)", err));
            }

            warn!(
                subject = %subject_ref,
                source = %self.source,
                attempt,
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Transient analyzer failure, will retry after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.missing(subject_ref, "cancelled during retry backoff");
                }
                _ = sleep_until(wake) => {}
            }

            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    fn missing(&self, subject_ref: &str, note: &str) -> Evidence {
        debug!(subject = %subject_ref, source = %self.source, reason = note, "Evidence missing");
        Evidence::missing(self.source, subject_ref, Utc::now(), note)
    }

    fn failed(&self, subject_ref: &str, note: impl Into<String>) -> Evidence {
        Evidence::failed(self.source, subject_ref, Utc::now(), note)
    }
}

/// Exactly one adapter per source
#[derive(Clone)]
pub struct AnalyzerSet {
    adapters: BTreeMap<Source, Arc<AnalyzerAdapter>>,
}

impl AnalyzerSet {
    pub fn new(adapters: Vec<AnalyzerAdapter>) -> RiskResult<Self> {
        let mut map = BTreeMap::new();
        for adapter in adapters {
            let source = adapter.source();
            if map.insert(source, Arc::new(adapter)).is_some() {
                return Err(RiskError::Configuration(format!(
                    "more than one analyzer configured for {}",
                    source
                )));
            }
        }

        if let Some(absent) = Source::ALL.iter().find(|s| !map.contains_key(s)) {
            return Err(RiskError::Configuration(format!(
                "no analyzer configured for {}",
                absent
            )));
        }

        Ok(Self { adapters: map })
    }

    /// Wrap clients with the policies from `config`
    pub fn from_config(
        config: &EngineConfig,
        clients: Vec<Arc<dyn AnalyzerClient>>,
    ) -> RiskResult<Self> {
        let normalizer = Normalizer::new(config.normalizer.clone());
        let adapters = clients
            .into_iter()
            .map(|client| {
                let policy = config.policy(client.source())?.clone();
                Ok(AnalyzerAdapter::new(client, policy, normalizer.clone()))
            })
            .collect::<RiskResult<Vec<_>>>()?;
        Self::new(adapters)
    }

    /// Adapters in canonical source order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AnalyzerAdapter>> {
        self.adapters.values()
    }

    pub fn get(&self, source: Source) -> Option<&Arc<AnalyzerAdapter>> {
        self.adapters.get(&source)
    }
}
