//! Evidence normalizer
//!
//! Maps each analyzer's native output onto the common [`EvidencePayload`]
//! shape for its source, assigns a confidence and decides between `Ok` and
//! `Degraded`. Missing and Failed evidence never pass through here: the
//! adapter builds those directly, without a payload.
//!
//! Confidence priors when a provider reports none:
//!
//! | Source           | Prior                                         |
//! |------------------|-----------------------------------------------|
//! | spectral         | 0.8                                           |
//! | thermal          | 0.7                                           |
//! | object detection | max class score (0.5 with no detections)      |
//! | narrative        | 0.6                                           |
//! | geocode          | 0.5 + 0.1 per map element, max 1.0 (0.3 none) |

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::analyzers::{RawBody, RawDetections, RawGeocode, RawNarrative, RawOutput, RawSpectral, RawThermal};
use crate::config::NormalizerConfig;
use crate::types::{
    Confidence, Evidence, EvidencePayload, EvidenceStatus, GeocodePayload, HeatLevel, LandCover,
    LocationType, Neighborhood, NarrativePayload, ObjectDetectionPayload, Source, SpectralPayload,
    ThermalPayload,
};

const SPECTRAL_PRIOR: f64 = 0.8;
const THERMAL_PRIOR: f64 = 0.7;
const EMPTY_DETECTION_PRIOR: f64 = 0.5;
const NARRATIVE_PRIOR: f64 = 0.6;
const GEOCODE_BASE_PRIOR: f64 = 0.5;
const GEOCODE_PER_ELEMENT: f64 = 0.1;
const GEOCODE_EMPTY_PRIOR: f64 = 0.3;

// Land-cover index thresholds
const NDVI_VEGETATION: f64 = 0.4;
const NDBI_BUILT_UP: f64 = 0.1;
const NDVI_BARE_SOIL: f64 = 0.2;

// Thermal hot-spot share thresholds (percent)
const HOT_SPOT_HIGH: f64 = 30.0;
const HOT_SPOT_MODERATE: f64 = 10.0;

/// Narrative keywords that raise risk
pub const RISK_KEYWORDS: &[&str] = &[
    "empty",
    "residential",
    "inappropriate",
    "facade",
    "shell",
    "suspicious",
    "vacant",
];

/// Narrative keywords consistent with an operating business
pub const POSITIVE_KEYWORDS: &[&str] = &[
    "warehouse",
    "office",
    "industrial",
    "commercial",
    "loading",
    "vehicles",
    "active",
];

/// Narrative phrases pointing at shared or nominal occupancy
pub const OCCUPANCY_KEYWORDS: &[&str] = &[
    "shared office",
    "coworking",
    "virtual office",
    "multi-tenant",
    "mail drop",
];

const INDUSTRIAL_INDICATORS: &[&str] = &["industrial", "warehouse", "factory", "logistics"];
const COMMERCIAL_INDICATORS: &[&str] = &["commercial", "retail", "office", "shop"];
const RESIDENTIAL_INDICATORS: &[&str] = &["residential", "house", "apartment"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Output of kind {actual} cannot be normalized as {expected}")]
    SourceMismatch { expected: Source, actual: Source },

    #[error("Field {0} is not a finite number")]
    NonFinite(&'static str),
}

/// Stateless normalizer parameterized by the `[normalizer]` config
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Turn one successful analyzer output into Ok or Degraded evidence
    pub fn normalize(
        &self,
        source: Source,
        subject_ref: &str,
        raw: RawOutput,
        fetched_at: DateTime<Utc>,
    ) -> Result<Evidence, NormalizeError> {
        let actual = raw.body.source();
        if actual != source {
            return Err(NormalizeError::SourceMismatch {
                expected: source,
                actual,
            });
        }

        let self_reported = match raw.confidence {
            Some(c) if !c.is_finite() => return Err(NormalizeError::NonFinite("confidence")),
            other => other,
        };

        let (payload, prior) = match raw.body {
            RawBody::Spectral(body) => normalize_spectral(body)?,
            RawBody::Thermal(body) => normalize_thermal(body)?,
            RawBody::ObjectDetection(body) => normalize_detections(body)?,
            RawBody::Narrative(body) => normalize_narrative(body),
            RawBody::Geocode(body) => normalize_geocode(body),
        };

        let confidence = self_reported.unwrap_or(prior).clamp(0.0, 1.0);

        let mut reasons = Vec::new();
        if raw.partial {
            reasons.push("analyzer reported a partial result".to_string());
        }
        if confidence < self.config.degraded_below {
            reasons.push(format!(
                "confidence {:.2} below {:.2}",
                confidence, self.config.degraded_below
            ));
        }
        if let Some(observed) = raw.observed_at {
            let age = fetched_at - observed;
            // Out-of-range limits cannot be exceeded
            let max_age = Duration::try_days(self.config.max_imagery_age_days);
            if max_age.is_some_and(|max| age > max) {
                reasons.push(format!("imagery is {} days old", age.num_days()));
            }
        }

        let (status, note) = if reasons.is_empty() {
            (EvidenceStatus::Ok, None)
        } else {
            (EvidenceStatus::Degraded, Some(reasons.join("; ")))
        };

        Ok(Evidence {
            source,
            subject_ref: subject_ref.to_string(),
            status,
            payload: Some(payload),
            confidence,
            observed_at: raw.observed_at,
            fetched_at,
            note,
        })
    }
}

fn finite(value: f64, field: &'static str) -> Result<f64, NormalizeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NormalizeError::NonFinite(field))
    }
}

fn percentage(reported: Option<f64>, index: f64, field: &'static str) -> Result<f64, NormalizeError> {
    let pct = match reported {
        Some(p) => finite(p, field)?,
        None => (index + 1.0) * 50.0,
    };
    Ok(pct.clamp(0.0, 100.0))
}

fn normalize_spectral(body: RawSpectral) -> Result<(EvidencePayload, Confidence), NormalizeError> {
    let ndvi = finite(body.ndvi_mean, "ndvi_mean")?;
    let ndbi = finite(body.ndbi_mean, "ndbi_mean")?;

    let vegetation_pct = percentage(body.vegetation_pct, ndvi, "vegetation_pct")?;
    let built_up_pct = percentage(body.built_up_pct, ndbi, "built_up_pct")?;
    let bare_soil_pct = match body.bare_soil_pct {
        Some(p) => finite(p, "bare_soil_pct")?.clamp(0.0, 100.0),
        None => 0.0,
    };

    let land_cover = match body.land_cover {
        Some(class) => class,
        // All three shares measured: largest share wins, first listed on ties
        None if body.vegetation_pct.is_some()
            && body.built_up_pct.is_some()
            && body.bare_soil_pct.is_some() =>
        {
            dominant_cover(vegetation_pct, built_up_pct, bare_soil_pct)
        }
        None => classify_from_indices(ndvi, ndbi),
    };

    let payload = EvidencePayload::Spectral(SpectralPayload {
        ndvi_mean: ndvi,
        ndbi_mean: ndbi,
        vegetation_pct,
        built_up_pct,
        bare_soil_pct,
        land_cover,
    });
    Ok((payload, SPECTRAL_PRIOR))
}

fn dominant_cover(vegetation: f64, built_up: f64, bare_soil: f64) -> LandCover {
    let mut best = (LandCover::Vegetation, vegetation);
    for candidate in [(LandCover::BuiltUp, built_up), (LandCover::BareSoil, bare_soil)] {
        if candidate.1 > best.1 {
            best = candidate;
        }
    }
    best.0
}

fn classify_from_indices(ndvi: f64, ndbi: f64) -> LandCover {
    if ndvi > NDVI_VEGETATION {
        LandCover::Vegetation
    } else if ndbi > NDBI_BUILT_UP {
        LandCover::BuiltUp
    } else if ndvi < NDVI_BARE_SOIL && ndbi < NDBI_BUILT_UP {
        LandCover::BareSoil
    } else {
        LandCover::Unknown
    }
}

fn normalize_thermal(body: RawThermal) -> Result<(EvidencePayload, Confidence), NormalizeError> {
    let mean_temperature_c = finite(body.mean_temperature_c, "mean_temperature_c")?;
    let hot_spot_pct = finite(body.hot_spot_pct, "hot_spot_pct")?.clamp(0.0, 100.0);

    let heat_level = body.heat_level.unwrap_or(if hot_spot_pct > HOT_SPOT_HIGH {
        HeatLevel::High
    } else if hot_spot_pct > HOT_SPOT_MODERATE {
        HeatLevel::Moderate
    } else {
        HeatLevel::Low
    });

    let payload = EvidencePayload::Thermal(ThermalPayload {
        mean_temperature_c,
        hot_spot_pct,
        heat_level,
    });
    Ok((payload, THERMAL_PRIOR))
}

fn normalize_detections(
    body: RawDetections,
) -> Result<(EvidencePayload, Confidence), NormalizeError> {
    let mut classes: BTreeMap<String, f64> = BTreeMap::new();
    for detection in body.detections {
        let score = finite(detection.score, "detection.score")?.clamp(0.0, 1.0);
        let class = detection.class.trim().to_lowercase();
        if class.is_empty() {
            continue;
        }
        let entry = classes.entry(class).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }

    let prior = classes
        .values()
        .copied()
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
        .unwrap_or(EMPTY_DETECTION_PRIOR);

    Ok((
        EvidencePayload::ObjectDetection(ObjectDetectionPayload { classes }),
        prior,
    ))
}

/// Split text into lowercase word tokens, keeping hyphenated words whole
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keywords whose whole-word token sequence occurs in the text
fn match_keywords(tokens: &[String], keywords: &[&str]) -> BTreeSet<String> {
    keywords
        .iter()
        .filter(|keyword| {
            let needle: Vec<&str> = keyword.split_whitespace().collect();
            tokens
                .windows(needle.len())
                .any(|window| window.iter().zip(&needle).all(|(t, n)| t == n))
        })
        .map(|keyword| keyword.to_string())
        .collect()
}

fn normalize_narrative(body: RawNarrative) -> (EvidencePayload, Confidence) {
    let tokens = tokenize(&body.text);
    let payload = EvidencePayload::Narrative(NarrativePayload {
        risk_tags: match_keywords(&tokens, RISK_KEYWORDS),
        positive_tags: match_keywords(&tokens, POSITIVE_KEYWORDS),
        occupancy_tags: match_keywords(&tokens, OCCUPANCY_KEYWORDS),
        text: body.text,
    });
    (payload, NARRATIVE_PRIOR)
}

fn normalize_geocode(body: RawGeocode) -> (EvidencePayload, Confidence) {
    let clean = |values: &[String]| -> Vec<String> {
        values
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect()
    };
    let land_uses = clean(&body.land_uses);
    let buildings = clean(&body.buildings);
    let amenities = clean(&body.amenities);

    let element_count = land_uses.len() + buildings.len() + amenities.len();
    let location_type = classify_location(&land_uses, &buildings, &amenities);
    let land_use = dominant_land_use(&land_uses);

    let prior = if element_count == 0 {
        GEOCODE_EMPTY_PRIOR
    } else {
        (GEOCODE_BASE_PRIOR + GEOCODE_PER_ELEMENT * element_count as f64).min(1.0)
    };

    let payload = EvidencePayload::Geocode(GeocodePayload {
        location_type,
        land_use,
        amenities: amenities.into_iter().collect(),
        neighborhood: body.neighborhood.unwrap_or(Neighborhood::Unknown),
    });
    (payload, prior)
}

/// Industrial indicators beat commercial beat residential; anything else is mixed
fn classify_location(land_uses: &[String], buildings: &[String], amenities: &[String]) -> LocationType {
    if land_uses.is_empty() && buildings.is_empty() && amenities.is_empty() {
        return LocationType::Unknown;
    }

    let has_any = |indicators: &[&str]| {
        land_uses
            .iter()
            .chain(buildings)
            .chain(amenities)
            .any(|element| indicators.contains(&element.as_str()))
    };

    if has_any(INDUSTRIAL_INDICATORS) {
        LocationType::Industrial
    } else if has_any(COMMERCIAL_INDICATORS) {
        LocationType::Commercial
    } else if has_any(RESIDENTIAL_INDICATORS) {
        LocationType::Residential
    } else {
        LocationType::Mixed
    }
}

/// Most frequent land use; alphabetical order breaks ties
fn dominant_land_use(land_uses: &[String]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for land_use in land_uses {
        *counts.entry(land_use.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (land_use, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((land_use, count));
        }
    }
    best.map(|(land_use, _)| land_use.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
