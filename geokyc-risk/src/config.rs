//! Engine configuration
//!
//! Loaded once from TOML at startup and validated exhaustively. Decision
//! parameters (weights, thresholds, floors, limits) carry no defaults: a
//! missing key fails the parse and therefore fails startup.

use geokyc_common::config::{load_toml_file, parse_toml, LoggingConfig};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RiskError, RiskResult};
use crate::types::Source;

/// Tolerance for the weight-sum check
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Full service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub normalizer: NormalizerConfig,
    pub pipeline: PipelineConfig,
    pub batch: BatchConfig,
    #[serde(deserialize_with = "source_map")]
    pub sources: BTreeMap<Source, SourcePolicy>,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Serve deterministic synthetic analyzer outputs instead of calling providers
    #[serde(default)]
    pub demo_mode: bool,
}

/// `[fusion]` decision parameters
#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Per-source weight; must cover every source and sum to 1
    #[serde(deserialize_with = "source_map")]
    pub weights: BTreeMap<Source, f64>,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub completeness_floor: f64,
    /// Minimum sub-score spread between two sources that counts as conflict
    pub divergence_threshold: f64,
    /// Only evidence at or above this confidence takes part in conflict detection
    pub conflict_min_confidence: f64,
}

/// `[normalizer]` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    /// Usable evidence below this confidence is marked Degraded
    pub degraded_below: f64,
    /// Imagery older than this is marked Degraded
    pub max_imagery_age_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Overall per-subject deadline
    pub deadline_ms: u64,
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    /// Maximum subjects analyzed at once across all batches
    pub global_concurrency: usize,
}

/// `[sources.<name>]` call policy
#[derive(Debug, Clone, Deserialize)]
pub struct SourcePolicy {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// In-flight calls allowed for this source across all runs
    pub max_concurrency: usize,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl SourcePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Append assessments as JSON lines to this file
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5780".to_string()
}

/// Deserialize a table keyed by source name
fn source_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<Source, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw = BTreeMap::<String, T>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.parse::<Source>()
                .map(|source| (source, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

impl EngineConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> RiskResult<Self> {
        let config: EngineConfig = load_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> RiskResult<Self> {
        let config: EngineConfig = parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RiskResult<()> {
        self.fusion.validate()?;
        self.normalizer.validate()?;

        if self.pipeline.deadline_ms == 0 {
            return Err(config_err("pipeline.deadline_ms must be at least 1"));
        }
        if self.batch.max_batch_size == 0 {
            return Err(config_err("batch.max_batch_size must be at least 1"));
        }
        if self.batch.global_concurrency == 0 {
            return Err(config_err("batch.global_concurrency must be at least 1"));
        }

        for source in Source::ALL {
            let policy = self
                .sources
                .get(&source)
                .ok_or_else(|| config_err(format!("sources.{} is not configured", source)))?;
            policy.validate(source)?;

            if !self.demo_mode && policy.endpoint.is_none() {
                return Err(config_err(format!(
                    "sources.{}.endpoint is required unless demo_mode is enabled",
                    source
                )));
            }
        }

        Ok(())
    }

    /// Policy for one source (validated to exist)
    pub fn policy(&self, source: Source) -> RiskResult<&SourcePolicy> {
        self.sources
            .get(&source)
            .ok_or_else(|| config_err(format!("sources.{} is not configured", source)))
    }
}

impl FusionConfig {
    pub fn validate(&self) -> RiskResult<()> {
        let mut sum = 0.0;
        for source in Source::ALL {
            let weight = *self
                .weights
                .get(&source)
                .ok_or_else(|| config_err(format!("fusion.weights.{} is missing", source)))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(config_err(format!(
                    "fusion.weights.{} must be a non-negative number, got {}",
                    source, weight
                )));
            }
            sum += weight;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(config_err(format!(
                "fusion.weights must sum to 1, got {}",
                sum
            )));
        }

        let (low, high) = (self.low_threshold, self.high_threshold);
        if !(low.is_finite() && high.is_finite() && 0.0 <= low && low < high && high <= 1.0) {
            return Err(config_err(format!(
                "thresholds must satisfy 0 <= low < high <= 1, got low={} high={}",
                low, high
            )));
        }

        check_unit("fusion.completeness_floor", self.completeness_floor)?;
        check_unit("fusion.conflict_min_confidence", self.conflict_min_confidence)?;

        // Sub-scores live in [-1, 1], so no spread can exceed 2
        let divergence = self.divergence_threshold;
        if !divergence.is_finite() || divergence < 0.0 || divergence >= 2.0 {
            return Err(config_err(format!(
                "fusion.divergence_threshold must be in [0, 2), got {}",
                divergence
            )));
        }

        Ok(())
    }

    pub fn weight(&self, source: Source) -> f64 {
        self.weights.get(&source).copied().unwrap_or(0.0)
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> RiskResult<()> {
        check_unit("normalizer.degraded_below", self.degraded_below)?;
        if self.max_imagery_age_days < 0 {
            return Err(config_err(format!(
                "normalizer.max_imagery_age_days must be non-negative, got {}",
                self.max_imagery_age_days
            )));
        }
        if chrono::Duration::try_days(self.max_imagery_age_days).is_none() {
            return Err(config_err(format!(
                "normalizer.max_imagery_age_days is out of range, got {}",
                self.max_imagery_age_days
            )));
        }
        Ok(())
    }
}

impl SourcePolicy {
    fn validate(&self, source: Source) -> RiskResult<()> {
        if self.timeout_ms == 0 {
            return Err(config_err(format!("sources.{}.timeout_ms must be at least 1", source)));
        }
        if self.max_concurrency == 0 {
            return Err(config_err(format!(
                "sources.{}.max_concurrency must be at least 1",
                source
            )));
        }
        if self.requests_per_second == Some(0) {
            return Err(config_err(format!(
                "sources.{}.requests_per_second must be at least 1",
                source
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> RiskResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_err(format!("{} must be in [0, 1], got {}", name, value)))
    }
}

fn config_err(msg: impl Into<String>) -> RiskError {
    RiskError::Configuration(msg.into())
}
