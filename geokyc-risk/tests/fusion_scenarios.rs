//! Fusion engine scenario tests
//!
//! Reference onboarding cases scored end to end through the rule tables
//! with the production weights (0.2 / 0.15 / 0.3 / 0.15 / 0.2), plus the
//! engine-wide properties: determinism, order independence, monotonicity,
//! the completeness gate and the conflict rule.

mod helpers;

use geokyc_risk::fusion::FusionEngine;
use geokyc_risk::types::{
    BusinessCategory, Evidence, Factor, HeatLevel, LandCover, LocationType, Neighborhood,
    Recommendation, RiskLevel, Source,
};
use helpers::*;

const EPS: f64 = 1e-9;

fn engine() -> FusionEngine {
    FusionEngine::new(test_config().fusion).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPS,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn contribution(assessment: &geokyc_risk::types::RiskAssessment, source: Source) -> f64 {
    assessment
        .contributions()
        .iter()
        .find(|c| c.factor == Factor::Source(source))
        .map(|c| c.signed_weight)
        .unwrap()
}

// ============================================================================
// Reference scenarios
// ============================================================================

#[test]
fn test_consistent_logistics_site_is_low_risk() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let assessment = engine().assess_at(&subject, logistics_site_evidence("NL-LOG-001"), fixed_time());

    // -0.085 - 0.072 - 0.216 - 0.09 - 0.09 = -0.553
    assert_close(assessment.overall_score(), 0.2235);
    assert_close(assessment.completeness(), 0.81);
    assert_close(assessment.confidence(), 0.81 * 0.81);
    assert_eq!(assessment.risk_level(), RiskLevel::Low);
    assert_eq!(assessment.recommendation(), Recommendation::AutoApprove);
    assert!(!assessment.conflicting());

    assert_close(contribution(&assessment, Source::ObjectDetection), -0.216);
    assert_eq!(assessment.contributions().len(), Source::ALL.len());
    assert!(assessment.risk_factors(3).is_empty());
    assert_eq!(assessment.positive_factors(1).len(), 1);
    assert!(assessment.positive_factors(1)[0].contains("truck"));
}

#[test]
fn test_residential_address_for_technology_company_is_blocked() {
    let id = "NL-TECH-002";
    let subject = subject(id, BusinessCategory::Technology);
    let evidence = vec![
        ok_evidence(id, spectral(LandCover::Vegetation), 0.85),
        ok_evidence(id, thermal(HeatLevel::Low), 0.8),
        ok_evidence(
            id,
            objects(&[("house", 0.92), ("swimming_pool", 0.8), ("garden", 0.7)]),
            0.92,
        ),
        ok_evidence(id, narrative(&["residential", "vacant"], &[], &[]), 0.6),
        ok_evidence(id, geocode(LocationType::Residential, Neighborhood::Suburban), 0.9),
    ];

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    // 0.119 + 0.012 + 0.276 + 0.045 + 0.144 = 0.596
    assert_close(assessment.overall_score(), 0.798);
    assert_eq!(assessment.risk_level(), RiskLevel::High);
    assert_eq!(assessment.recommendation(), Recommendation::Block);
    assert!(!assessment.conflicting());

    let top = assessment.risk_factors(1);
    assert!(top[0].contains("Residential-only"), "top factor: {}", top[0]);
    assert!(assessment.summary().starts_with("HIGH RISK (score 0.80)"));
}

#[test]
fn test_shared_office_tower_for_consultancy_needs_review() {
    let id = "NL-CONS-003";
    let subject = subject(id, BusinessCategory::Consulting);
    let evidence = vec![
        ok_evidence(id, spectral(LandCover::BuiltUp), 0.85),
        ok_evidence(id, thermal(HeatLevel::Moderate), 0.7),
        ok_evidence(id, objects(&[("commercial_tower", 0.88)]), 0.88),
        ok_evidence(
            id,
            narrative(
                &[],
                &["commercial", "office"],
                &["coworking", "shared office", "virtual office"],
            ),
            0.6,
        ),
        ok_evidence(id, geocode(LocationType::Commercial, Neighborhood::Urban), 0.9),
    ];

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    // -0.068 - 0.021 + 0.0 + 0.0585 - 0.09 = -0.1205
    assert_close(assessment.overall_score(), 0.43975);
    assert_close(contribution(&assessment, Source::ObjectDetection), 0.0);
    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
    assert_eq!(assessment.recommendation(), Recommendation::ManualReview);
    assert!(!assessment.conflicting());
}

#[test]
fn test_failed_source_lowers_confidence_but_still_decides() {
    let id = "NL-LOG-001";
    let subject = subject(id, BusinessCategory::Logistics);
    let mut evidence = logistics_site_evidence(id);
    evidence[2] = Evidence::failed(
        Source::ObjectDetection,
        id,
        fixed_time(),
        "provider rejected the request",
    );

    let full = engine().assess_at(&subject, logistics_site_evidence(id), fixed_time());
    let partial = engine().assess_at(&subject, evidence, fixed_time());

    assert_close(partial.overall_score(), 0.3315);
    assert_close(partial.completeness(), 0.63);
    assert_close(partial.confidence(), 0.63 * 0.7875);
    assert!(partial.confidence() < full.confidence());
    assert_eq!(partial.risk_level(), RiskLevel::Low);

    let object = partial
        .contributions()
        .iter()
        .find(|c| c.factor == Factor::Source(Source::ObjectDetection))
        .unwrap();
    assert_eq!(object.signed_weight, 0.0);
    assert!(object.rationale.contains("failed"));
}

#[test]
fn test_payload_from_another_source_is_not_scored() {
    let id = "NL-LOG-001";
    let subject = subject(id, BusinessCategory::Logistics);
    let mut evidence = logistics_site_evidence(id);
    // Geocode record wrapping an object-detection payload
    evidence[4] = Evidence {
        source: Source::Geocode,
        ..ok_evidence(id, objects(&[("truck", 0.9)]), 0.9)
    };

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    assert_close(contribution(&assessment, Source::Geocode), 0.0);
    // 3.15 of usable confidence across five weighted sources
    assert_close(assessment.completeness(), 0.63);
    assert!(!assessment.evidence_for(Source::Geocode).unwrap().is_usable());

    let geocode = assessment
        .contributions()
        .iter()
        .find(|c| c.factor == Factor::Source(Source::Geocode))
        .unwrap();
    assert_eq!(geocode.confidence, 0.0);
    assert!(geocode.rationale.contains("object_detection payload"));
}

// ============================================================================
// Engine-wide properties
// ============================================================================

#[test]
fn test_assessment_is_deterministic() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let engine = engine();

    let a = engine.assess_at(&subject, logistics_site_evidence("NL-LOG-001"), fixed_time());
    let b = engine.assess_at(&subject, logistics_site_evidence("NL-LOG-001"), fixed_time());

    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn test_evidence_order_does_not_matter() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let engine = engine();
    let evidence = logistics_site_evidence("NL-LOG-001");

    let baseline = engine.assess_at(&subject, evidence.clone(), fixed_time());

    let mut reversed = evidence.clone();
    reversed.reverse();
    assert_eq!(engine.assess_at(&subject, reversed, fixed_time()), baseline);

    for shift in 1..evidence.len() {
        let mut rotated = evidence.clone();
        rotated.rotate_left(shift);
        assert_eq!(engine.assess_at(&subject, rotated, fixed_time()), baseline);
    }
}

#[test]
fn test_duplicate_evidence_resolves_independently_of_order() {
    let id = "NL-LOG-001";
    let subject = subject(id, BusinessCategory::Logistics);
    let engine = engine();

    let mut evidence = logistics_site_evidence(id);
    evidence.push(Evidence::missing(Source::Thermal, id, fixed_time(), "late"));
    evidence.push(ok_evidence(id, thermal(HeatLevel::Low), 0.5));

    let forward = engine.assess_at(&subject, evidence.clone(), fixed_time());
    evidence.reverse();
    let backward = engine.assess_at(&subject, evidence, fixed_time());

    assert_eq!(forward, backward);
    assert_eq!(forward.evidence_snapshot().len(), Source::ALL.len());
    // Higher-confidence usable record wins
    assert_close(forward.evidence_for(Source::Thermal).unwrap().confidence, 0.8);
}

#[test]
fn test_evidence_for_other_subjects_is_ignored() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let engine = engine();

    let mut evidence = logistics_site_evidence("NL-LOG-001");
    evidence.push(ok_evidence(
        "SOMEONE-ELSE",
        geocode(LocationType::Residential, Neighborhood::Remote),
        1.0,
    ));

    let assessment = engine.assess_at(&subject, evidence, fixed_time());
    assert_close(assessment.overall_score(), 0.2235);
    assert!(assessment
        .evidence_snapshot()
        .iter()
        .all(|e| e.subject_ref == "NL-LOG-001"));
}

#[test]
fn test_score_is_monotonic_in_each_sub_score() {
    let id = "NL-TECH-004";
    let subject = subject(id, BusinessCategory::Technology);
    let engine = engine();

    let base = |geo: LocationType, risk_tags: &[&str]| {
        vec![
            ok_evidence(id, spectral(LandCover::BuiltUp), 0.8),
            ok_evidence(id, thermal(HeatLevel::Moderate), 0.8),
            ok_evidence(id, objects(&[("office_building", 0.8)]), 0.8),
            ok_evidence(id, narrative(risk_tags, &[], &[]), 0.8),
            ok_evidence(id, geocode(geo, Neighborhood::Urban), 0.8),
        ]
    };

    // Geocode sub-scores for a commercial site: -0.5, +0.1, +0.3, +0.8
    let locations = [
        LocationType::Commercial,
        LocationType::Mixed,
        LocationType::Industrial,
        LocationType::Residential,
    ];
    let scores: Vec<f64> = locations
        .iter()
        .map(|geo| engine.assess_at(&subject, base(*geo, &[]), fixed_time()).overall_score())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] < w[1]), "scores: {:?}", scores);

    let tags = ["dormant", "residential", "shell", "vacant"];
    let scores: Vec<f64> = (0..=tags.len())
        .map(|n| {
            engine
                .assess_at(&subject, base(LocationType::Commercial, &tags[..n]), fixed_time())
                .overall_score()
        })
        .collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]), "scores: {:?}", scores);
}

#[test]
fn test_no_evidence_is_never_low_risk() {
    let subject = subject("NL-EMPTY-005", BusinessCategory::Retail);
    let evidence: Vec<Evidence> = Source::ALL
        .into_iter()
        .map(|s| Evidence::missing(s, "NL-EMPTY-005", fixed_time(), "deadline elapsed"))
        .collect();

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    assert_eq!(assessment.completeness(), 0.0);
    assert_eq!(assessment.confidence(), 0.0);
    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
    assert_eq!(assessment.recommendation(), Recommendation::ManualReview);
    assert!(assessment
        .contributions()
        .iter()
        .any(|c| c.factor == Factor::CompletenessGate));
}

#[test]
fn test_empty_evidence_set_hits_completeness_gate() {
    let subject = subject("NL-EMPTY-006", BusinessCategory::Retail);
    let assessment = engine().assess_at(&subject, Vec::new(), fixed_time());

    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
    assert_eq!(assessment.recommendation(), Recommendation::ManualReview);
    assert_eq!(
        assessment
            .contributions()
            .iter()
            .filter(|c| matches!(c.factor, Factor::Source(_)))
            .count(),
        Source::ALL.len()
    );
}

#[test]
fn test_conflicting_sources_force_manual_review() {
    let id = "NL-LOG-007";
    let subject = subject(id, BusinessCategory::Logistics);
    let evidence = vec![
        ok_evidence(id, spectral(LandCover::BuiltUp), 0.85),
        ok_evidence(id, thermal(HeatLevel::High), 0.8),
        ok_evidence(
            id,
            objects(&[("loading_dock", 0.9), ("truck", 0.9), ("warehouse", 0.9)]),
            0.9,
        ),
        ok_evidence(id, geocode(LocationType::Residential, Neighborhood::Suburban), 0.9),
    ];

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    // Numerically LOW (0.3765), but objects say -1.0 and geocode says +1.0
    assert_close(assessment.overall_score(), 0.3765);
    assert!(assessment.conflicting());
    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
    assert_eq!(assessment.recommendation(), Recommendation::ManualReview);
    assert!(assessment
        .contributions()
        .iter()
        .any(|c| c.factor == Factor::ConflictRule));
}

#[test]
fn test_conflict_overrides_high_band() {
    let id = "NL-TECH-008";
    let subject = subject(id, BusinessCategory::Technology);
    let evidence = vec![
        ok_evidence(id, spectral(LandCover::Vegetation), 1.0),
        ok_evidence(id, thermal(HeatLevel::Low), 1.0),
        ok_evidence(id, objects(&[("house", 0.95)]), 1.0),
        ok_evidence(
            id,
            narrative(&["dormant", "residential", "shell", "vacant"], &[], &[]),
            1.0,
        ),
        ok_evidence(id, geocode(LocationType::Commercial, Neighborhood::Urban), 1.0),
    ];

    let assessment = engine().assess_at(&subject, evidence, fixed_time());

    assert_close(assessment.overall_score(), 0.7525);
    assert!(assessment.conflicting());
    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
}

#[test]
fn test_low_confidence_disagreement_is_not_a_conflict() {
    let id = "NL-LOG-009";
    let subject = subject(id, BusinessCategory::Logistics);
    let mut evidence = logistics_site_evidence(id);
    // Weak residential geocode against confident industrial detections
    evidence.retain(|e| e.source != Source::Geocode);
    evidence.push(ok_evidence(
        id,
        geocode(LocationType::Residential, Neighborhood::Suburban),
        0.5,
    ));

    let assessment = engine().assess_at(&subject, evidence, fixed_time());
    assert!(!assessment.conflicting());
}

#[test]
fn test_band_lower_bounds_are_inclusive() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let evidence = logistics_site_evidence("NL-LOG-001");
    let score = engine()
        .assess_at(&subject, evidence.clone(), fixed_time())
        .overall_score();

    let mut at_low = test_config().fusion;
    at_low.low_threshold = score;
    at_low.high_threshold = score + 0.2;
    let assessment = FusionEngine::new(at_low)
        .unwrap()
        .assess_at(&subject, evidence.clone(), fixed_time());
    assert_eq!(assessment.risk_level(), RiskLevel::Medium);
    assert_eq!(assessment.recommendation(), Recommendation::ManualReview);

    let mut at_high = test_config().fusion;
    at_high.low_threshold = score - 0.1;
    at_high.high_threshold = score;
    let assessment = FusionEngine::new(at_high)
        .unwrap()
        .assess_at(&subject, evidence, fixed_time());
    assert_eq!(assessment.risk_level(), RiskLevel::High);
    assert_eq!(assessment.recommendation(), Recommendation::Block);
}

#[test]
fn test_invalid_fusion_config_is_rejected() {
    let mut config = test_config().fusion;
    config.weights.insert(Source::Narrative, 0.5);
    assert!(FusionEngine::new(config).is_err());

    let mut config = test_config().fusion;
    config.low_threshold = 0.8;
    assert!(FusionEngine::new(config).is_err());
}

#[test]
fn test_ruleset_version_is_stamped() {
    let subject = subject("NL-LOG-001", BusinessCategory::Logistics);
    let assessment = engine().assess_at(&subject, logistics_site_evidence("NL-LOG-001"), fixed_time());
    assert_eq!(assessment.ruleset_version(), geokyc_risk::fusion::RULESET_VERSION);
    assert_eq!(assessment.created_at(), fixed_time());
}
