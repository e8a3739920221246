//! Test Helper Utilities
//!
//! Shared fixtures for geokyc-risk integration tests: a tight engine
//! configuration, subject and evidence builders, and scripted analyzer
//! clients that count calls and track how many run at once.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geokyc_risk::analyzers::{
    AnalyzerClient, AnalyzerError, RawBody, RawDetection, RawDetections, RawGeocode,
    RawNarrative, RawOutput, RawSpectral, RawThermal,
};
use geokyc_risk::config::EngineConfig;
use geokyc_risk::types::{
    BusinessCategory, Evidence, EvidencePayload, EvidenceStatus, Geocode, GeocodePayload,
    HeatLevel, LandCover, LocationType, NarrativePayload, Neighborhood, ObjectDetectionPayload,
    Source, SpectralPayload, Subject, ThermalPayload,
};

/// Engine configuration with short budgets so pipeline tests stay fast
pub const TEST_CONFIG: &str = r#"
demo_mode = true

[fusion]
low_threshold = 0.4
high_threshold = 0.7
completeness_floor = 0.5
divergence_threshold = 1.0
conflict_min_confidence = 0.7

[fusion.weights]
spectral = 0.2
thermal = 0.15
object_detection = 0.3
narrative = 0.15
geocode = 0.2

[normalizer]
degraded_below = 0.4
max_imagery_age_days = 365

[pipeline]
deadline_ms = 1000

[batch]
max_batch_size = 100
global_concurrency = 4

[sources.spectral]
timeout_ms = 300
max_retries = 2
initial_backoff_ms = 5
max_concurrency = 2

[sources.thermal]
timeout_ms = 300
max_retries = 2
initial_backoff_ms = 5
max_concurrency = 2

[sources.object_detection]
timeout_ms = 300
max_retries = 2
initial_backoff_ms = 5
max_concurrency = 2

[sources.narrative]
timeout_ms = 300
max_retries = 2
initial_backoff_ms = 5
max_concurrency = 2

[sources.geocode]
timeout_ms = 300
max_retries = 2
initial_backoff_ms = 5
max_concurrency = 2
"#;

pub fn test_config() -> EngineConfig {
    EngineConfig::from_toml_str(TEST_CONFIG).expect("test config is valid")
}

/// Route test logs through the libtest writer; safe to call repeatedly
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("geokyc_risk=debug")
        .with_test_writer()
        .try_init();
}

/// Fixed clock for deterministic assessments
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn subject(id: &str, category: BusinessCategory) -> Subject {
    Subject::new(
        id,
        Geocode {
            latitude: 52.37,
            longitude: 4.89,
            accuracy_m: 10.0,
        },
        category,
        "",
    )
}

// ============================================================================
// Evidence builders
// ============================================================================

pub fn ok_evidence(subject_ref: &str, payload: EvidencePayload, confidence: f64) -> Evidence {
    Evidence {
        source: payload.source(),
        subject_ref: subject_ref.to_string(),
        status: EvidenceStatus::Ok,
        payload: Some(payload),
        confidence,
        observed_at: Some(fixed_time() - chrono::Duration::days(30)),
        fetched_at: fixed_time(),
        note: None,
    }
}

pub fn spectral(land_cover: LandCover) -> EvidencePayload {
    let (ndvi, ndbi) = match land_cover {
        LandCover::Vegetation => (0.6, -0.1),
        LandCover::BuiltUp => (0.1, 0.25),
        LandCover::BareSoil => (0.1, 0.0),
        LandCover::Unknown => (0.3, 0.05),
    };
    EvidencePayload::Spectral(SpectralPayload {
        ndvi_mean: ndvi,
        ndbi_mean: ndbi,
        vegetation_pct: (ndvi + 1.0) * 50.0,
        built_up_pct: (ndbi + 1.0) * 50.0,
        bare_soil_pct: 0.0,
        land_cover,
    })
}

pub fn thermal(heat_level: HeatLevel) -> EvidencePayload {
    let hot_spot_pct = match heat_level {
        HeatLevel::High => 35.0,
        HeatLevel::Moderate => 20.0,
        HeatLevel::Low => 5.0,
    };
    EvidencePayload::Thermal(ThermalPayload {
        mean_temperature_c: 30.0,
        hot_spot_pct,
        heat_level,
    })
}

pub fn objects(classes: &[(&str, f64)]) -> EvidencePayload {
    EvidencePayload::ObjectDetection(ObjectDetectionPayload {
        classes: classes
            .iter()
            .map(|(class, score)| (class.to_string(), *score))
            .collect::<BTreeMap<_, _>>(),
    })
}

pub fn narrative(risk: &[&str], positive: &[&str], occupancy: &[&str]) -> EvidencePayload {
    fn tags(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }
    EvidencePayload::Narrative(NarrativePayload {
        text: "scripted narrative".to_string(),
        risk_tags: tags(risk),
        positive_tags: tags(positive),
        occupancy_tags: tags(occupancy),
    })
}

pub fn geocode(location_type: LocationType, neighborhood: Neighborhood) -> EvidencePayload {
    EvidencePayload::Geocode(GeocodePayload {
        location_type,
        land_use: location_type.to_string(),
        amenities: BTreeSet::new(),
        neighborhood,
    })
}

/// Five consistent industrial sources for a logistics business
pub fn logistics_site_evidence(subject_ref: &str) -> Vec<Evidence> {
    vec![
        ok_evidence(subject_ref, spectral(LandCover::BuiltUp), 0.85),
        ok_evidence(subject_ref, thermal(HeatLevel::High), 0.8),
        ok_evidence(subject_ref, objects(&[("truck", 0.9), ("warehouse", 0.85)]), 0.9),
        ok_evidence(
            subject_ref,
            narrative(
                &[],
                &["active", "industrial", "loading", "vehicles", "warehouse"],
                &[],
            ),
            0.6,
        ),
        ok_evidence(subject_ref, geocode(LocationType::Industrial, Neighborhood::Urban), 0.9),
    ]
}

// ============================================================================
// Raw analyzer outputs
// ============================================================================

/// Raw output a provider would return for a working logistics yard
pub fn industrial_raw(source: Source) -> RawOutput {
    match source {
        Source::Spectral => RawOutput::new(RawBody::Spectral(RawSpectral {
            ndvi_mean: 0.1,
            ndbi_mean: 0.25,
            vegetation_pct: None,
            built_up_pct: None,
            bare_soil_pct: None,
            land_cover: Some(LandCover::BuiltUp),
        }))
        .with_confidence(0.85),
        Source::Thermal => RawOutput::new(RawBody::Thermal(RawThermal {
            mean_temperature_c: 34.0,
            hot_spot_pct: 38.0,
            heat_level: None,
        }))
        .with_confidence(0.8),
        Source::ObjectDetection => RawOutput::new(RawBody::ObjectDetection(RawDetections {
            detections: vec![
                RawDetection {
                    class: "truck".into(),
                    score: 0.9,
                },
                RawDetection {
                    class: "warehouse".into(),
                    score: 0.85,
                },
            ],
        })),
        Source::Narrative => RawOutput::new(RawBody::Narrative(RawNarrative {
            text: "Active industrial site with a large warehouse, loading bays and parked vehicles."
                .into(),
        })),
        Source::Geocode => RawOutput::new(RawBody::Geocode(RawGeocode {
            land_uses: vec!["industrial".into(), "industrial".into()],
            buildings: vec!["warehouse".into()],
            amenities: vec!["parking".into()],
            neighborhood: Some(Neighborhood::Urban),
        }))
        .with_confidence(0.9),
    }
}

// ============================================================================
// Scripted analyzer client
// ============================================================================

type DelayFn = Box<dyn Fn(&Subject) -> Duration + Send + Sync>;

/// Analyzer client with scripted latency and failures
pub struct ScriptedClient {
    source: Source,
    delay: DelayFn,
    /// Transient failures to return before the first success
    transient_failures: u32,
    permanent_failure: bool,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            delay: Box::new(|_| Duration::ZERO),
            transient_failures: 0,
            permanent_failure: false,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    pub fn with_delay_fn(
        mut self,
        delay: impl Fn(&Subject) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn failing_transiently(mut self, times: u32) -> Self {
        self.transient_failures = times;
        self
    }

    pub fn failing_permanently(mut self) -> Self {
        self.permanent_failure = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent fetches observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the fetch future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalyzerClient for ScriptedClient {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, subject: &Subject, _budget: Duration) -> Result<RawOutput, AnalyzerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = (self.delay)(subject);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.permanent_failure {
            return Err(AnalyzerError::Rejected("scripted rejection".into()));
        }
        if call <= self.transient_failures {
            return Err(AnalyzerError::Unavailable(format!("scripted outage {}", call)));
        }

        Ok(industrial_raw(self.source))
    }
}

/// One scripted client per source, customizable per source
pub struct ScriptedAnalyzers {
    clients: BTreeMap<Source, Arc<ScriptedClient>>,
}

impl ScriptedAnalyzers {
    pub fn new() -> Self {
        Self::with(|client| client)
    }

    /// Build every client through `configure`
    pub fn with(configure: impl Fn(ScriptedClient) -> ScriptedClient) -> Self {
        let clients = Source::ALL
            .into_iter()
            .map(|source| (source, Arc::new(configure(ScriptedClient::new(source)))))
            .collect();
        Self { clients }
    }

    /// Replace one source's client
    pub fn replace(mut self, client: ScriptedClient) -> Self {
        self.clients.insert(client.source(), Arc::new(client));
        self
    }

    pub fn get(&self, source: Source) -> &Arc<ScriptedClient> {
        &self.clients[&source]
    }

    pub fn total_calls(&self) -> u32 {
        self.clients.values().map(|c| c.calls()).sum()
    }

    pub fn clients(&self) -> Vec<Arc<dyn AnalyzerClient>> {
        self.clients
            .values()
            .map(|c| Arc::clone(c) as Arc<dyn AnalyzerClient>)
            .collect()
    }
}
