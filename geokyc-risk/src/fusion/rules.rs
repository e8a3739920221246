//! Per-source rule tables
//!
//! Each rule maps one payload to a signed sub-score in [-1, 1] plus the
//! rationale recorded in the audit trail. Positive means risk-increasing.
//! Rules are total: every payload shape has an explicit row below.
//!
//! Object detection (classes at or above the 0.50 detection floor):
//!
//! | Detected                                       | Sub-score                  |
//! |------------------------------------------------|----------------------------|
//! | nothing                                        | +0.5                       |
//! | n expected classes (shared-occupancy excluded) | -(0.4 + 0.2 * min(n, 3))   |
//! | only shared-occupancy expected classes         | 0.0                        |
//! | residential classes only                       | +1.0 (+0.4 on mixed sites) |
//! | residential mixed with unexpected classes      | +0.3                       |
//! | unexpected classes only                        | +0.4                       |
//!
//! Spectral land cover:
//!
//! | Land cover | Industrial | Commercial | Mixed |
//! |------------|------------|------------|-------|
//! | built-up   | -0.5       | -0.4       | -0.3  |
//! | vegetation | +0.7       | +0.7       | +0.3  |
//! | bare soil  | +0.5       | +0.5       | +0.5  |
//! | unknown    | 0.0        | 0.0        | 0.0   |
//!
//! Thermal activity:
//!
//! | Heat level | Industrial | Commercial | Mixed |
//! |------------|------------|------------|-------|
//! | high       | -0.6       | -0.4       | -0.3  |
//! | moderate   | -0.2       | -0.2       | -0.2  |
//! | low        | +0.5       | +0.1       | 0.0   |
//!
//! Geocode location type (then +0.3 for a rural/remote neighbourhood on a
//! commercial site, clamped):
//!
//! | Location                  | Industrial | Commercial | Mixed |
//! |---------------------------|------------|------------|-------|
//! | residential               | +1.0       | +0.8       | +0.4  |
//! | expected for the category | -0.5       | -0.5       | -0.5  |
//! | unexpected industrial     | +0.3       | +0.3       | +0.3  |
//! | unexpected commercial     | +0.2       | +0.2       | +0.2  |
//! | mixed                     | +0.1       | +0.1       | +0.1  |
//! | unknown                   | 0.0        | 0.0        | 0.0   |
//!
//! Narrative: `0.25 * risk_tags - 0.2 * positive_tags + 0.35 * occupancy_tags`,
//! clamped; no tags scores 0.

use std::collections::BTreeSet;

use super::profile::{profile_for, CategoryProfile, SiteClass, RESIDENTIAL_OBJECTS, SHARED_OCCUPANCY_OBJECTS};
use crate::types::{
    BusinessCategory, EvidencePayload, GeocodePayload, HeatLevel, LandCover, LocationType,
    NarrativePayload, Neighborhood, ObjectDetectionPayload, SpectralPayload, ThermalPayload,
};

/// Detector scores below this are treated as not detected
pub const DETECTION_FLOOR: f64 = 0.5;

const NARRATIVE_RISK_TAG: f64 = 0.25;
const NARRATIVE_POSITIVE_TAG: f64 = 0.2;
const NARRATIVE_OCCUPANCY_TAG: f64 = 0.35;

const REMOTE_COMMERCIAL_PENALTY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub sub_score: f64,
    pub rationale: String,
}

impl RuleOutcome {
    fn new(sub_score: f64, rationale: impl Into<String>) -> Self {
        Self {
            sub_score: sub_score.clamp(-1.0, 1.0),
            rationale: rationale.into(),
        }
    }
}

/// Apply the rule table for the payload's source
pub fn evaluate(payload: &EvidencePayload, category: BusinessCategory) -> RuleOutcome {
    let profile = profile_for(category);
    match payload {
        EvidencePayload::Spectral(p) => spectral_rule(p, profile),
        EvidencePayload::Thermal(p) => thermal_rule(p, profile),
        EvidencePayload::ObjectDetection(p) => object_rule(p, profile, category),
        EvidencePayload::Narrative(p) => narrative_rule(p),
        EvidencePayload::Geocode(p) => geocode_rule(p, profile, category),
    }
}

fn join(classes: &BTreeSet<&str>) -> String {
    classes.iter().copied().collect::<Vec<_>>().join(", ")
}

fn object_rule(
    payload: &ObjectDetectionPayload,
    profile: &CategoryProfile,
    category: BusinessCategory,
) -> RuleOutcome {
    let present: BTreeSet<&str> = payload
        .classes
        .iter()
        .filter(|(_, score)| **score >= DETECTION_FLOOR)
        .map(|(class, _)| class.as_str())
        .collect();

    if present.is_empty() {
        return RuleOutcome::new(
            0.5,
            format!(
                "No structures detected above the {:.2} detection floor",
                DETECTION_FLOOR
            ),
        );
    }

    let expected: BTreeSet<&str> = present
        .iter()
        .copied()
        .filter(|class| profile.expects_object(class))
        .collect();
    let confirming: BTreeSet<&str> = expected
        .iter()
        .copied()
        .filter(|class| !SHARED_OCCUPANCY_OBJECTS.contains(class))
        .collect();

    if !confirming.is_empty() {
        let n = confirming.len().min(3) as f64;
        return RuleOutcome::new(
            -(0.4 + 0.2 * n),
            format!(
                "Detected infrastructure consistent with {}: {}",
                category,
                join(&confirming)
            ),
        );
    }

    if !expected.is_empty() {
        return RuleOutcome::new(
            0.0,
            format!(
                "Only shared-occupancy buildings detected ({}); occupancy by the applicant cannot be confirmed",
                join(&expected)
            ),
        );
    }

    let residential: BTreeSet<&str> = present
        .iter()
        .copied()
        .filter(|class| RESIDENTIAL_OBJECTS.contains(class))
        .collect();

    if residential.len() == present.len() {
        let score = if profile.site_class == SiteClass::Mixed { 0.4 } else { 1.0 };
        return RuleOutcome::new(
            score,
            format!(
                "Residential-only signature ({}) for a declared {} business",
                join(&residential),
                category
            ),
        );
    }

    if !residential.is_empty() {
        return RuleOutcome::new(
            0.3,
            format!(
                "Residential structures ({}) mixed with classes unrelated to {}: {}",
                join(&residential),
                category,
                join(&present.difference(&residential).copied().collect())
            ),
        );
    }

    RuleOutcome::new(
        0.4,
        format!(
            "Detected classes do not match declared {} activity: {}",
            category,
            join(&present)
        ),
    )
}

fn spectral_rule(payload: &SpectralPayload, profile: &CategoryProfile) -> RuleOutcome {
    let site = profile.site_class;
    match payload.land_cover {
        LandCover::BuiltUp => {
            let score = match site {
                SiteClass::Industrial => -0.5,
                SiteClass::Commercial => -0.4,
                SiteClass::Mixed => -0.3,
            };
            RuleOutcome::new(
                score,
                format!(
                    "Built-up land cover ({:.0}% built-up) consistent with an operating site",
                    payload.built_up_pct
                ),
            )
        }
        LandCover::Vegetation => {
            let score = if site == SiteClass::Mixed { 0.3 } else { 0.7 };
            RuleOutcome::new(
                score,
                format!(
                    "Vegetation-dominated land cover ({:.0}% vegetation) inconsistent with declared activity",
                    payload.vegetation_pct
                ),
            )
        }
        LandCover::BareSoil => RuleOutcome::new(
            0.5,
            format!(
                "Bare-soil land cover ({:.0}% bare soil) suggests no established premises",
                payload.bare_soil_pct
            ),
        ),
        LandCover::Unknown => RuleOutcome::new(0.0, "Land cover could not be classified"),
    }
}

fn thermal_rule(payload: &ThermalPayload, profile: &CategoryProfile) -> RuleOutcome {
    let site = profile.site_class;
    let (score, description) = match payload.heat_level {
        HeatLevel::High => (
            match site {
                SiteClass::Industrial => -0.6,
                SiteClass::Commercial => -0.4,
                SiteClass::Mixed => -0.3,
            },
            "high thermal activity consistent with active operations",
        ),
        HeatLevel::Moderate => (-0.2, "moderate thermal activity"),
        HeatLevel::Low => (
            match site {
                SiteClass::Industrial => 0.5,
                SiteClass::Commercial => 0.1,
                SiteClass::Mixed => 0.0,
            },
            "low thermal activity",
        ),
    };

    RuleOutcome::new(
        score,
        format!(
            "Thermal: {} ({:.0}% hot spots, mean {:.1} C)",
            description, payload.hot_spot_pct, payload.mean_temperature_c
        ),
    )
}

fn geocode_rule(
    payload: &GeocodePayload,
    profile: &CategoryProfile,
    category: BusinessCategory,
) -> RuleOutcome {
    let site = profile.site_class;
    let location = payload.location_type;

    let (base, mut rationale) = match location {
        LocationType::Residential => (
            match site {
                SiteClass::Industrial => 1.0,
                SiteClass::Commercial => 0.8,
                SiteClass::Mixed => 0.4,
            },
            format!("Address lies in a residential area for a declared {} business", category),
        ),
        LocationType::Unknown => (0.0, "Address land use could not be determined".to_string()),
        other if profile.expects_location(other) => (
            -0.5,
            format!("Address land use ({}) matches declared {} activity", other, category),
        ),
        LocationType::Industrial => (
            0.3,
            format!("Industrial address is unusual for a declared {} business", category),
        ),
        LocationType::Commercial => (
            0.2,
            format!("Commercial address is unusual for a declared {} business", category),
        ),
        LocationType::Mixed => (0.1, "Address lies in a mixed-use area".to_string()),
    };

    let remote = matches!(payload.neighborhood, Neighborhood::Rural | Neighborhood::Remote);
    let score = if remote && site == SiteClass::Commercial {
        rationale.push_str("; rural/remote setting is unusual for a commercial business");
        base + REMOTE_COMMERCIAL_PENALTY
    } else {
        base
    };

    RuleOutcome::new(score, rationale)
}

fn narrative_rule(payload: &NarrativePayload) -> RuleOutcome {
    let risk = payload.risk_tags.len() as f64;
    let positive = payload.positive_tags.len() as f64;
    let occupancy = payload.occupancy_tags.len() as f64;

    if risk + positive + occupancy == 0.0 {
        return RuleOutcome::new(0.0, "Scene narrative carries no risk or activity indicators");
    }

    let score = NARRATIVE_RISK_TAG * risk - NARRATIVE_POSITIVE_TAG * positive
        + NARRATIVE_OCCUPANCY_TAG * occupancy;

    let mut parts = Vec::new();
    let list = |tags: &BTreeSet<String>| tags.iter().cloned().collect::<Vec<_>>().join(", ");
    if !payload.risk_tags.is_empty() {
        parts.push(format!("risk indicators [{}]", list(&payload.risk_tags)));
    }
    if !payload.positive_tags.is_empty() {
        parts.push(format!("activity indicators [{}]", list(&payload.positive_tags)));
    }
    if !payload.occupancy_tags.is_empty() {
        parts.push(format!("shared-occupancy indicators [{}]", list(&payload.occupancy_tags)));
    }

    RuleOutcome::new(score, format!("Scene narrative: {}", parts.join("; ")))
}
