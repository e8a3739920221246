//! External analyzer contract
//!
//! One [`AnalyzerClient`] per source talks to a provider and returns its
//! native output as a [`RawOutput`]. [`adapter::AnalyzerAdapter`] wraps a
//! client with timeout, retry and quota policy and turns every outcome into
//! [`crate::types::Evidence`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::{HeatLevel, LandCover, Neighborhood, Source, Subject};

pub mod adapter;
pub mod demo_client;
pub mod http_client;

pub use adapter::{AnalyzerAdapter, AnalyzerSet};
pub use demo_client::{demo_clients, DemoAnalyzerClient};
pub use http_client::HttpAnalyzerClient;

/// Analyzer call failure
#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    /// Provider temporarily unavailable (429, 5xx, connection failure)
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    /// Provider did not answer within the call timeout
    #[error("Analyzer call timed out")]
    Timeout,

    /// Provider refused the request (4xx other than 429)
    #[error("Analyzer rejected request: {0}")]
    Rejected(String),

    /// Provider answered with something that is not a valid output
    #[error("Malformed analyzer output: {0}")]
    Malformed(String),
}

impl AnalyzerError {
    /// Transient failures are retried; permanent ones are not
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::Unavailable(_) | AnalyzerError::Timeout)
    }
}

/// Analyzer client trait - one implementation per provider
#[async_trait]
pub trait AnalyzerClient: Send + Sync {
    /// Source this client produces evidence for
    fn source(&self) -> Source;

    /// Fetch the provider's native output for a subject
    ///
    /// `budget` is the time left for this call; providers may use it to
    /// trim their own work. Must be idempotent for the same subject.
    async fn fetch(&self, subject: &Subject, budget: Duration) -> Result<RawOutput, AnalyzerError>;
}

/// Native analyzer output before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub body: RawBody,
    /// Self-reported confidence, if the provider has one
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Imagery acquisition time
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    /// Provider flagged the result as incomplete
    #[serde(default)]
    pub partial: bool,
}

impl RawOutput {
    pub fn new(body: RawBody) -> Self {
        Self {
            body,
            confidence: None,
            observed_at: None,
            partial: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

/// Provider-native body, one shape per source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawBody {
    Spectral(RawSpectral),
    Thermal(RawThermal),
    ObjectDetection(RawDetections),
    Narrative(RawNarrative),
    Geocode(RawGeocode),
}

impl RawBody {
    pub fn source(&self) -> Source {
        match self {
            RawBody::Spectral(_) => Source::Spectral,
            RawBody::Thermal(_) => Source::Thermal,
            RawBody::ObjectDetection(_) => Source::ObjectDetection,
            RawBody::Narrative(_) => Source::Narrative,
            RawBody::Geocode(_) => Source::Geocode,
        }
    }
}

/// Spectral index statistics over the site footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpectral {
    pub ndvi_mean: f64,
    pub ndbi_mean: f64,
    #[serde(default)]
    pub vegetation_pct: Option<f64>,
    #[serde(default)]
    pub built_up_pct: Option<f64>,
    #[serde(default)]
    pub bare_soil_pct: Option<f64>,
    #[serde(default)]
    pub land_cover: Option<LandCover>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawThermal {
    pub mean_temperature_c: f64,
    pub hot_spot_pct: f64,
    #[serde(default)]
    pub heat_level: Option<HeatLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetections {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNarrative {
    pub text: String,
}

/// Map elements around the geocode (land uses, building types, amenities)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawGeocode {
    #[serde(default)]
    pub land_uses: Vec<String>,
    #[serde(default)]
    pub buildings: Vec<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub neighborhood: Option<Neighborhood>,
}
