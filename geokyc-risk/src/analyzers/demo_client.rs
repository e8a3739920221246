//! Demo analyzer client
//!
//! Serves synthetic outputs without calling any provider. Everything is
//! derived from a SHA-256 of the business identifier, so the same subject
//! always gets the same evidence. Roughly one subject in four gets a
//! residential profile; the rest look like their declared category.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::{
    AnalyzerClient, AnalyzerError, RawBody, RawDetection, RawDetections, RawGeocode,
    RawNarrative, RawOutput, RawSpectral, RawThermal,
};
use crate::fusion::profile::{profile_for, SiteClass, SHARED_OCCUPANCY_OBJECTS};
use crate::types::{Neighborhood, Source, Subject};

pub struct DemoAnalyzerClient {
    source: Source,
}

impl DemoAnalyzerClient {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

/// Deterministic per-subject randomness
struct Seed([u8; 32]);

impl Seed {
    fn of(subject: &Subject) -> Self {
        let digest = Sha256::digest(subject.business_id.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Value in [0, 1] from byte `i`
    fn unit(&self, i: usize) -> f64 {
        f64::from(self.0[i % 32]) / 255.0
    }

    fn residential(&self) -> bool {
        self.0[0] % 4 == 0
    }
}

fn consistent_output(source: Source, subject: &Subject, seed: &Seed) -> RawBody {
    let profile = profile_for(subject.category);
    match source {
        Source::Spectral => RawBody::Spectral(RawSpectral {
            ndvi_mean: 0.05 + 0.1 * seed.unit(1),
            ndbi_mean: 0.15 + 0.15 * seed.unit(2),
            vegetation_pct: None,
            built_up_pct: None,
            bare_soil_pct: None,
            land_cover: None,
        }),
        Source::Thermal => RawBody::Thermal(RawThermal {
            mean_temperature_c: 28.0 + 6.0 * seed.unit(3),
            hot_spot_pct: match profile.site_class {
                SiteClass::Industrial => 32.0 + 10.0 * seed.unit(4),
                _ => 12.0 + 15.0 * seed.unit(4),
            },
            heat_level: None,
        }),
        Source::ObjectDetection => RawBody::ObjectDetection(RawDetections {
            detections: profile
                .expected_objects
                .iter()
                .filter(|class| !SHARED_OCCUPANCY_OBJECTS.contains(class))
                .take(2)
                .enumerate()
                .map(|(i, class)| RawDetection {
                    class: class.to_string(),
                    score: 0.7 + 0.25 * seed.unit(5 + i),
                })
                .collect(),
        }),
        Source::Narrative => RawBody::Narrative(RawNarrative {
            text: match profile.site_class {
                SiteClass::Industrial => {
                    "Active industrial site with a large warehouse, loading bays and parked vehicles."
                }
                SiteClass::Commercial => {
                    "Commercial office building with active storefronts and street access."
                }
                SiteClass::Mixed => "Mixed-use block with a commercial ground floor.",
            }
            .to_string(),
        }),
        Source::Geocode => RawBody::Geocode(RawGeocode {
            land_uses: match profile.site_class {
                SiteClass::Industrial => vec!["industrial".into(), "industrial".into()],
                _ => vec!["commercial".into(), "retail".into()],
            },
            buildings: match profile.site_class {
                SiteClass::Industrial => vec!["warehouse".into()],
                _ => vec!["office".into()],
            },
            amenities: vec!["parking".into()],
            neighborhood: Some(Neighborhood::Urban),
        }),
    }
}

fn residential_output(source: Source, seed: &Seed) -> RawBody {
    match source {
        Source::Spectral => RawBody::Spectral(RawSpectral {
            ndvi_mean: 0.45 + 0.2 * seed.unit(1),
            ndbi_mean: -0.1 + 0.1 * seed.unit(2),
            vegetation_pct: None,
            built_up_pct: None,
            bare_soil_pct: None,
            land_cover: None,
        }),
        Source::Thermal => RawBody::Thermal(RawThermal {
            mean_temperature_c: 24.0 + 4.0 * seed.unit(3),
            hot_spot_pct: 2.0 + 6.0 * seed.unit(4),
            heat_level: None,
        }),
        Source::ObjectDetection => RawBody::ObjectDetection(RawDetections {
            detections: vec![
                RawDetection {
                    class: "house".into(),
                    score: 0.75 + 0.2 * seed.unit(5),
                },
                RawDetection {
                    class: "swimming_pool".into(),
                    score: 0.6 + 0.3 * seed.unit(6),
                },
            ],
        }),
        Source::Narrative => RawBody::Narrative(RawNarrative {
            text: "Quiet residential street; a single-family house with a garden and no signage or business activity visible."
                .to_string(),
        }),
        Source::Geocode => RawBody::Geocode(RawGeocode {
            land_uses: vec!["residential".into(), "residential".into()],
            buildings: vec!["house".into()],
            amenities: vec![],
            neighborhood: Some(Neighborhood::Suburban),
        }),
    }
}

#[async_trait]
impl AnalyzerClient for DemoAnalyzerClient {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, subject: &Subject, _budget: Duration) -> Result<RawOutput, AnalyzerError> {
        let seed = Seed::of(subject);
        let body = if seed.residential() {
            residential_output(self.source, &seed)
        } else {
            consistent_output(self.source, subject, &seed)
        };

        let age_days = i64::from(seed.0[7] % 60);
        Ok(RawOutput::new(body).observed_at(Utc::now() - ChronoDuration::days(age_days)))
    }
}

/// One demo client per source
pub fn demo_clients() -> Vec<Arc<dyn AnalyzerClient>> {
    Source::ALL
        .into_iter()
        .map(|source| Arc::new(DemoAnalyzerClient::new(source)) as Arc<dyn AnalyzerClient>)
        .collect()
}
