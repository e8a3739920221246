//! Core domain types for onboarding risk assessment
//!
//! - [`Subject`]: the business/location under analysis (immutable once submitted)
//! - [`Evidence`]: one normalized observation from one analyzer source
//! - [`RiskAssessment`]: the fused verdict plus its audit trail
//!
//! `Subject` and `Evidence` are plain data. `RiskAssessment` keeps its fields
//! private: it is produced once by the fusion engine and only read afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{RiskError, RiskResult};

/// Confidence score (0.0-1.0)
pub type Confidence = f64;

// ============================================================================
// Sources
// ============================================================================

/// Analyzer source producing one kind of evidence
///
/// Declaration order is the canonical processing order inside the fusion
/// engine and the order of `contributions` in every assessment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Spectral,
    Thermal,
    ObjectDetection,
    Narrative,
    Geocode,
}

impl Source {
    /// Every source, in canonical order
    pub const ALL: [Source; 5] = [
        Source::Spectral,
        Source::Thermal,
        Source::ObjectDetection,
        Source::Narrative,
        Source::Geocode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Spectral => "spectral",
            Source::Thermal => "thermal",
            Source::ObjectDetection => "object_detection",
            Source::Narrative => "narrative",
            Source::Geocode => "geocode",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| format!("unknown source '{}'", s))
    }
}

// ============================================================================
// Subject
// ============================================================================

/// Resolved geocode for the registered address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geocode {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters
    pub accuracy_m: f64,
}

/// Declared business category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessCategory {
    Logistics,
    Transport,
    Manufacturing,
    Construction,
    Technology,
    Consulting,
    Retail,
    Restaurant,
    #[serde(other)]
    Other,
}

impl BusinessCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessCategory::Logistics => "logistics",
            BusinessCategory::Transport => "transport",
            BusinessCategory::Manufacturing => "manufacturing",
            BusinessCategory::Construction => "construction",
            BusinessCategory::Technology => "technology",
            BusinessCategory::Consulting => "consulting",
            BusinessCategory::Retail => "retail",
            BusinessCategory::Restaurant => "restaurant",
            BusinessCategory::Other => "other",
        }
    }
}

impl fmt::Display for BusinessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity under analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Business identifier (registry number)
    pub business_id: String,
    pub geocode: Geocode,
    pub category: BusinessCategory,
    /// Free-text declared activity
    #[serde(default)]
    pub declared_activity: String,
}

impl Subject {
    pub fn new(
        business_id: impl Into<String>,
        geocode: Geocode,
        category: BusinessCategory,
        declared_activity: impl Into<String>,
    ) -> Self {
        Self {
            business_id: business_id.into(),
            geocode,
            category,
            declared_activity: declared_activity.into(),
        }
    }

    /// Reference used to tie evidence and assessments to this subject
    pub fn subject_ref(&self) -> &str {
        &self.business_id
    }

    /// Reject malformed subjects before any analyzer is called
    pub fn validate(&self) -> RiskResult<()> {
        if self.business_id.trim().is_empty() {
            return Err(RiskError::InvalidSubject(
                "business identifier is empty".to_string(),
            ));
        }

        let g = &self.geocode;
        if !g.latitude.is_finite() || !(-90.0..=90.0).contains(&g.latitude) {
            return Err(RiskError::InvalidSubject(format!(
                "latitude {} outside [-90, 90]",
                g.latitude
            )));
        }
        if !g.longitude.is_finite() || !(-180.0..=180.0).contains(&g.longitude) {
            return Err(RiskError::InvalidSubject(format!(
                "longitude {} outside [-180, 180]",
                g.longitude
            )));
        }
        if !g.accuracy_m.is_finite() || g.accuracy_m < 0.0 {
            return Err(RiskError::InvalidSubject(format!(
                "accuracy radius {} must be a non-negative number of meters",
                g.accuracy_m
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// Outcome of one analyzer call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Complete result
    Ok,
    /// Low-confidence, stale or partial result
    Degraded,
    /// No result within budget
    Missing,
    /// Call errored after retries
    Failed,
}

impl EvidenceStatus {
    /// Ok and Degraded evidence carries a payload that feeds the score
    pub fn is_usable(self) -> bool {
        matches!(self, EvidenceStatus::Ok | EvidenceStatus::Degraded)
    }
}

impl fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceStatus::Ok => "ok",
            EvidenceStatus::Degraded => "degraded",
            EvidenceStatus::Missing => "missing",
            EvidenceStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Dominant land-cover class from spectral indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandCover {
    Vegetation,
    BuiltUp,
    BareSoil,
    Unknown,
}

/// Thermal activity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    Low,
    Moderate,
    High,
}

/// Land-use classification of the registered address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Industrial,
    Commercial,
    Residential,
    Mixed,
    Unknown,
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocationType::Industrial => "industrial",
            LocationType::Commercial => "commercial",
            LocationType::Residential => "residential",
            LocationType::Mixed => "mixed",
            LocationType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Neighbourhood context around the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    Urban,
    Suburban,
    Rural,
    Remote,
    Unknown,
}

/// Vegetation/built-up indices and the derived land cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralPayload {
    pub ndvi_mean: f64,
    pub ndbi_mean: f64,
    pub vegetation_pct: f64,
    pub built_up_pct: f64,
    pub bare_soil_pct: f64,
    pub land_cover: LandCover,
}

/// Surface temperature summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalPayload {
    pub mean_temperature_c: f64,
    /// Share of the area above mean + 1 std (0-100)
    pub hot_spot_pct: f64,
    pub heat_level: HeatLevel,
}

/// Detected object classes with their best score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetectionPayload {
    /// class label -> max score over detections of that class
    pub classes: BTreeMap<String, f64>,
}

/// Scene narrative with extracted tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePayload {
    pub text: String,
    pub risk_tags: BTreeSet<String>,
    pub positive_tags: BTreeSet<String>,
    /// Shared-office / coworking / virtual-office phrases
    pub occupancy_tags: BTreeSet<String>,
}

/// Address context from geocoding and map data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodePayload {
    pub location_type: LocationType,
    pub land_use: String,
    pub amenities: BTreeSet<String>,
    pub neighborhood: Neighborhood,
}

/// Source-specific normalized payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePayload {
    Spectral(SpectralPayload),
    Thermal(ThermalPayload),
    ObjectDetection(ObjectDetectionPayload),
    Narrative(NarrativePayload),
    Geocode(GeocodePayload),
}

impl EvidencePayload {
    pub fn source(&self) -> Source {
        match self {
            EvidencePayload::Spectral(_) => Source::Spectral,
            EvidencePayload::Thermal(_) => Source::Thermal,
            EvidencePayload::ObjectDetection(_) => Source::ObjectDetection,
            EvidencePayload::Narrative(_) => Source::Narrative,
            EvidencePayload::Geocode(_) => Source::Geocode,
        }
    }
}

/// One normalized observation from one analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: Source,
    pub subject_ref: String,
    pub status: EvidenceStatus,
    /// Always `None` for Missing/Failed evidence
    pub payload: Option<EvidencePayload>,
    pub confidence: Confidence,
    /// Image acquisition time reported by the analyzer
    pub observed_at: Option<DateTime<Utc>>,
    /// Call completion time
    pub fetched_at: DateTime<Utc>,
    /// Why the evidence is degraded, missing or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Evidence {
    /// Evidence for a source that produced nothing within budget
    pub fn missing(
        source: Source,
        subject_ref: impl Into<String>,
        fetched_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self::without_payload(source, subject_ref, EvidenceStatus::Missing, fetched_at, note)
    }

    /// Evidence for a source whose call errored
    pub fn failed(
        source: Source,
        subject_ref: impl Into<String>,
        fetched_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self::without_payload(source, subject_ref, EvidenceStatus::Failed, fetched_at, note)
    }

    fn without_payload(
        source: Source,
        subject_ref: impl Into<String>,
        status: EvidenceStatus,
        fetched_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            source,
            subject_ref: subject_ref.into(),
            status,
            payload: None,
            confidence: 0.0,
            observed_at: None,
            fetched_at,
            note: Some(note.into()),
        }
    }

    /// Usable evidence has an Ok/Degraded status and a payload of its own source
    pub fn is_usable(&self) -> bool {
        self.usable_payload().is_some()
    }

    /// Payload that may feed the score
    pub fn usable_payload(&self) -> Option<&EvidencePayload> {
        if !self.status.is_usable() {
            return None;
        }
        self.payload.as_ref().filter(|p| p.source() == self.source)
    }

    /// Age of the underlying imagery at fetch time
    pub fn staleness(&self) -> Option<chrono::Duration> {
        self.observed_at.map(|observed| self.fetched_at - observed)
    }
}

// ============================================================================
// Risk Assessment
// ============================================================================

/// Risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Onboarding decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    AutoApprove,
    ManualReview,
    Block,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::AutoApprove => "AUTO_APPROVE",
            Recommendation::ManualReview => "MANUAL_REVIEW",
            Recommendation::Block => "BLOCK",
        };
        f.write_str(s)
    }
}

/// What an audit-trail entry is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// A single analyzer source
    Source(Source),
    /// Engine-level note: evidence below the completeness floor
    CompletenessGate,
    /// Engine-level note: high-confidence sources contradict each other
    ConflictRule,
}

/// One audit-trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub factor: Factor,
    /// weight * sub_score * confidence; positive increases risk
    pub signed_weight: f64,
    /// Rule-table output in [-1, 1]
    pub sub_score: f64,
    pub confidence: Confidence,
    pub rationale: String,
}

/// Fused verdict for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    subject_ref: String,
    overall_score: f64,
    risk_level: RiskLevel,
    confidence: Confidence,
    completeness: f64,
    recommendation: Recommendation,
    conflicting: bool,
    contributions: Vec<Contribution>,
    evidence_snapshot: Vec<Evidence>,
    summary: String,
    ruleset_version: String,
    created_at: DateTime<Utc>,
}

/// Field bundle used by the fusion engine to build an assessment
#[derive(Debug, Clone)]
pub(crate) struct AssessmentParts {
    pub subject_ref: String,
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub completeness: f64,
    pub recommendation: Recommendation,
    pub conflicting: bool,
    pub contributions: Vec<Contribution>,
    pub evidence_snapshot: Vec<Evidence>,
    pub summary: String,
    pub ruleset_version: String,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub(crate) fn from_parts(parts: AssessmentParts) -> Self {
        Self {
            subject_ref: parts.subject_ref,
            overall_score: parts.overall_score,
            risk_level: parts.risk_level,
            confidence: parts.confidence,
            completeness: parts.completeness,
            recommendation: parts.recommendation,
            conflicting: parts.conflicting,
            contributions: parts.contributions,
            evidence_snapshot: parts.evidence_snapshot,
            summary: parts.summary,
            ruleset_version: parts.ruleset_version,
            created_at: parts.created_at,
        }
    }

    /// Summary is derived from the finished assessment, so it is filled in last
    pub(crate) fn set_summary(&mut self, summary: String) {
        self.summary = summary;
    }

    pub fn subject_ref(&self) -> &str {
        &self.subject_ref
    }

    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn completeness(&self) -> f64 {
        self.completeness
    }

    pub fn recommendation(&self) -> Recommendation {
        self.recommendation
    }

    pub fn conflicting(&self) -> bool {
        self.conflicting
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    pub fn evidence_snapshot(&self) -> &[Evidence] {
        &self.evidence_snapshot
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Evidence for one source, if it is part of the snapshot
    pub fn evidence_for(&self, source: Source) -> Option<&Evidence> {
        self.evidence_snapshot.iter().find(|e| e.source == source)
    }

    /// Strongest risk-increasing rationales, largest first
    pub fn risk_factors(&self, limit: usize) -> Vec<&str> {
        self.ranked_factors(limit, |w| w > 0.0)
    }

    /// Strongest risk-reducing rationales, largest first
    pub fn positive_factors(&self, limit: usize) -> Vec<&str> {
        self.ranked_factors(limit, |w| w < 0.0)
    }

    fn ranked_factors(&self, limit: usize, keep: impl Fn(f64) -> bool) -> Vec<&str> {
        let mut ranked: Vec<&Contribution> = self
            .contributions
            .iter()
            .filter(|c| matches!(c.factor, Factor::Source(_)) && keep(c.signed_weight))
            .collect();
        ranked.sort_by(|a, b| b.signed_weight.abs().total_cmp(&a.signed_weight.abs()));
        ranked
            .into_iter()
            .take(limit)
            .map(|c| c.rationale.as_str())
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject::new(
            "12.345.678/0001-90",
            Geocode {
                latitude: -23.55,
                longitude: -46.63,
                accuracy_m: 25.0,
            },
            BusinessCategory::Logistics,
            "Freight forwarding and warehousing",
        )
    }

    #[test]
    fn test_valid_subject() {
        assert!(subject().validate().is_ok());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let mut s = subject();
        s.business_id = "   ".to_string();
        assert!(matches!(s.validate(), Err(RiskError::InvalidSubject(_))));
    }

    #[test]
    fn test_malformed_geocode_rejected() {
        let mut s = subject();
        s.geocode.latitude = 91.0;
        assert!(matches!(s.validate(), Err(RiskError::InvalidSubject(_))));

        let mut s = subject();
        s.geocode.longitude = f64::NAN;
        assert!(matches!(s.validate(), Err(RiskError::InvalidSubject(_))));

        let mut s = subject();
        s.geocode.accuracy_m = -1.0;
        assert!(matches!(s.validate(), Err(RiskError::InvalidSubject(_))));
    }

    #[test]
    fn test_unknown_category_deserializes_as_other() {
        let category: BusinessCategory = serde_json::from_str("\"fintech\"").unwrap();
        assert_eq!(category, BusinessCategory::Other);
    }

    #[test]
    fn test_missing_evidence_has_no_payload() {
        let e = Evidence::missing(Source::Thermal, "x", Utc::now(), "deadline");
        assert_eq!(e.status, EvidenceStatus::Missing);
        assert!(e.payload.is_none());
        assert_eq!(e.confidence, 0.0);
        assert!(!e.is_usable());
    }

    #[test]
    fn test_staleness() {
        let fetched = Utc::now();
        let mut e = Evidence::failed(Source::Spectral, "x", fetched, "boom");
        assert!(e.staleness().is_none());
        e.observed_at = Some(fetched - chrono::Duration::days(10));
        assert_eq!(e.staleness().unwrap().num_days(), 10);
    }

    #[test]
    fn test_level_and_recommendation_wire_names() {
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(
            serde_json::to_string(&Recommendation::AutoApprove).unwrap(),
            "\"AUTO_APPROVE\""
        );
        assert_eq!(
            serde_json::to_string(&Source::ObjectDetection).unwrap(),
            "\"object_detection\""
        );
    }
}
