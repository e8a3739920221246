//! HTTP analyzer client
//!
//! POSTs `{"subject": ..., "budget_ms": ...}` to the source's endpoint and
//! expects a [`RawOutput`] JSON body back. Status classification:
//! - 2xx: decode body (decode failure is permanent)
//! - 429, 5xx, connect errors, timeouts: transient
//! - other 4xx: permanent

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Serialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use super::{AnalyzerClient, AnalyzerError, RawOutput};
use crate::config::SourcePolicy;
use crate::error::{RiskError, RiskResult};
use crate::types::{Source, Subject};

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    subject: &'a Subject,
    budget_ms: u64,
}

pub struct HttpAnalyzerClient {
    source: Source,
    endpoint: String,
    client: reqwest::Client,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpAnalyzerClient {
    pub fn new(
        source: Source,
        endpoint: impl Into<String>,
        requests_per_second: Option<u32>,
    ) -> RiskResult<Self> {
        let rate_limiter = match requests_per_second {
            Some(rps) => {
                let rps = NonZeroU32::new(rps).ok_or_else(|| {
                    RiskError::Configuration(format!(
                        "sources.{}.requests_per_second must be at least 1",
                        source
                    ))
                })?;
                Some(RateLimiter::direct(Quota::per_second(rps)))
            }
            None => None,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("geokyc-risk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RiskError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            source,
            endpoint: endpoint.into(),
            client,
            rate_limiter,
        })
    }

    /// Build from a source policy; the policy must name an endpoint
    pub fn from_policy(source: Source, policy: &SourcePolicy) -> RiskResult<Self> {
        let endpoint = policy.endpoint.clone().ok_or_else(|| {
            RiskError::Configuration(format!("sources.{}.endpoint is not set", source))
        })?;
        Self::new(source, endpoint, policy.requests_per_second)
    }
}

fn classify_transport(err: reqwest::Error) -> AnalyzerError {
    if err.is_timeout() {
        AnalyzerError::Timeout
    } else if err.is_decode() {
        AnalyzerError::Malformed(err.to_string())
    } else {
        AnalyzerError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl AnalyzerClient for HttpAnalyzerClient {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, subject: &Subject, budget: Duration) -> Result<RawOutput, AnalyzerError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        debug!(subject = %subject.subject_ref(), source = %self.source, endpoint = %self.endpoint, "Calling analyzer");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(budget)
            .json(&AnalyzeRequest {
                subject,
                budget_ms: budget.as_millis() as u64,
            })
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AnalyzerError::Unavailable(format!("analyzer returned {}", status)));
        }
        if !status.is_success() {
            return Err(AnalyzerError::Rejected(format!("analyzer returned {}", status)));
        }

        let bytes = response.bytes().await.map_err(classify_transport)?;
        serde_json::from_slice::<RawOutput>(&bytes).map_err(|e| AnalyzerError::Malformed(e.to_string()))
    }
}
