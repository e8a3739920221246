//! Fusion engine: evidence set → risk assessment
//!
//! Pure and deterministic. The same subject and evidence set (in any
//! order) always yields the same assessment apart from `created_at`.
//!
//! Algorithm:
//! 1. Canonicalize: drop evidence for other subjects, keep the best record
//!    per source, order by source.
//! 2. Completeness: mean usable confidence over sources with weight > 0.
//! 3. Per-source sub-scores from [`rules`]; contribution = w * s * c.
//! 4. `overall_score = clamp((Σ contributions + 1) / 2, 0, 1)`.
//! 5. Conflict: two usable sources at or above `conflict_min_confidence`
//!    on opposite sides of zero, more than `divergence_threshold` apart.
//! 6. Decision: completeness gate, then conflict, then threshold bands
//!    (each band inclusive on its lower bound).
//! 7. `confidence = completeness * mean confidence of non-zero contributions`.

pub mod profile;
pub mod rules;

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::FusionConfig;
use crate::error::RiskResult;
use crate::types::{
    AssessmentParts, Contribution, Evidence, Factor, Recommendation, RiskAssessment, RiskLevel,
    Source, Subject,
};

/// Version of the rule tables, profiles and fusion formula
pub const RULESET_VERSION: &str = "geokyc-rules/1.0";

/// Rationales quoted in the summary per direction
const SUMMARY_FACTORS: usize = 2;

pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    /// Fails fast on invalid weights or thresholds
    pub fn new(config: FusionConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Assess with the current time as `created_at`
    pub fn assess(&self, subject: &Subject, evidence: Vec<Evidence>) -> RiskAssessment {
        self.assess_at(subject, evidence, Utc::now())
    }

    /// Assess with an explicit `created_at`
    pub fn assess_at(
        &self,
        subject: &Subject,
        evidence: Vec<Evidence>,
        created_at: DateTime<Utc>,
    ) -> RiskAssessment {
        let subject_ref = subject.subject_ref();
        let snapshot = canonicalize(subject_ref, evidence);

        let mut contributions = Vec::with_capacity(Source::ALL.len() + 2);
        let mut weighted_sum = 0.0;
        let mut usable_confidence = 0.0;
        let mut weighted_sources = 0usize;
        // (source, sub_score) of usable, high-confidence, weighted evidence
        let mut conflict_candidates: Vec<(Source, f64)> = Vec::new();

        for source in Source::ALL {
            let weight = self.config.weight(source);
            if weight > 0.0 {
                weighted_sources += 1;
            }

            let evidence = snapshot.iter().find(|e| e.source == source);
            let contribution = match evidence.map(|e| (e, e.usable_payload())) {
                Some((e, Some(payload))) => {
                    let confidence = sanitize(e.confidence);
                    let outcome = rules::evaluate(payload, subject.category);
                    let signed_weight = weight * outcome.sub_score * confidence;

                    weighted_sum += signed_weight;
                    if weight > 0.0 {
                        usable_confidence += confidence;
                        if confidence >= self.config.conflict_min_confidence {
                            conflict_candidates.push((source, outcome.sub_score));
                        }
                    }

                    Contribution {
                        factor: Factor::Source(source),
                        signed_weight,
                        sub_score: outcome.sub_score,
                        confidence,
                        rationale: outcome.rationale,
                    }
                }
                Some((e, None)) => Contribution {
                    factor: Factor::Source(source),
                    signed_weight: 0.0,
                    sub_score: 0.0,
                    confidence: 0.0,
                    rationale: unusable_rationale(e),
                },
                None => Contribution {
                    factor: Factor::Source(source),
                    signed_weight: 0.0,
                    sub_score: 0.0,
                    confidence: 0.0,
                    rationale: format!("No {} evidence supplied", source),
                },
            };
            contributions.push(contribution);
        }

        let completeness = if weighted_sources == 0 {
            0.0
        } else {
            (usable_confidence / weighted_sources as f64).clamp(0.0, 1.0)
        };
        let overall_score = ((weighted_sum + 1.0) / 2.0).clamp(0.0, 1.0);
        let conflict = detect_conflict(&conflict_candidates, self.config.divergence_threshold);
        let insufficient = completeness < self.config.completeness_floor;

        let (risk_level, recommendation) = if insufficient || conflict.is_some() {
            (RiskLevel::Medium, Recommendation::ManualReview)
        } else {
            self.band(overall_score)
        };

        let confidence = calibrate(completeness, &contributions);

        if insufficient {
            contributions.push(Contribution {
                factor: Factor::CompletenessGate,
                signed_weight: 0.0,
                sub_score: 0.0,
                confidence: completeness,
                rationale: format!(
                    "Insufficient evidence: completeness {:.2} below floor {:.2}; manual review required",
                    completeness, self.config.completeness_floor
                ),
            });
        }
        if let Some((high, low)) = conflict {
            contributions.push(Contribution {
                factor: Factor::ConflictRule,
                signed_weight: 0.0,
                sub_score: high.1 - low.1,
                confidence: 0.0,
                rationale: format!(
                    "Conflicting evidence: {} ({:+.2}) contradicts {} ({:+.2}); verdict capped at MEDIUM",
                    high.0, high.1, low.0, low.1
                ),
            });
        }

        debug!(
            subject = %subject_ref,
            score = overall_score,
            completeness,
            confidence,
            conflicting = conflict.is_some(),
            level = %risk_level,
            "Evidence fused"
        );

        let mut assessment = RiskAssessment::from_parts(AssessmentParts {
            subject_ref: subject_ref.to_string(),
            overall_score,
            risk_level,
            confidence,
            completeness,
            recommendation,
            conflicting: conflict.is_some(),
            contributions,
            evidence_snapshot: snapshot,
            summary: String::new(),
            ruleset_version: RULESET_VERSION.to_string(),
            created_at,
        });
        let summary = summarize(&assessment, insufficient);
        assessment.set_summary(summary);
        assessment
    }

    fn band(&self, score: f64) -> (RiskLevel, Recommendation) {
        if score >= self.config.high_threshold {
            (RiskLevel::High, Recommendation::Block)
        } else if score >= self.config.low_threshold {
            (RiskLevel::Medium, Recommendation::ManualReview)
        } else {
            (RiskLevel::Low, Recommendation::AutoApprove)
        }
    }
}

fn sanitize(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Evidence for this subject, one record per source, in source order
fn canonicalize(subject_ref: &str, evidence: Vec<Evidence>) -> Vec<Evidence> {
    let mut relevant: Vec<Evidence> = evidence
        .into_iter()
        .filter(|e| e.subject_ref == subject_ref)
        .collect();

    // Best record first within each source so dedup keeps it
    relevant.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| preference(b, a)));
    relevant.dedup_by(|later, earlier| later.source == earlier.source);
    relevant
}

fn unusable_rationale(e: &Evidence) -> String {
    match (&e.payload, &e.note) {
        (Some(payload), _) if e.status.is_usable() && payload.source() != e.source => format!(
            "{} evidence carries a {} payload; ignored",
            e.source,
            payload.source()
        ),
        (_, Some(note)) => format!("{} evidence {}: {}", e.source, e.status, note),
        (_, None) => format!("{} evidence {}", e.source, e.status),
    }
}

/// Usable beats unusable, then higher confidence, then newer fetch; the
/// serialized form breaks remaining ties so input order never matters
fn preference(a: &Evidence, b: &Evidence) -> Ordering {
    a.is_usable()
        .cmp(&b.is_usable())
        .then_with(|| sanitize(a.confidence).total_cmp(&sanitize(b.confidence)))
        .then_with(|| a.fetched_at.cmp(&b.fetched_at))
        .then_with(|| {
            let a_json = serde_json::to_string(a).unwrap_or_default();
            let b_json = serde_json::to_string(b).unwrap_or_default();
            a_json.cmp(&b_json)
        })
}

/// Most risk-increasing and most risk-reducing candidates, if they conflict
fn detect_conflict(candidates: &[(Source, f64)], divergence: f64) -> Option<((Source, f64), (Source, f64))> {
    let mut high: Option<(Source, f64)> = None;
    let mut low: Option<(Source, f64)> = None;
    for &(source, sub_score) in candidates {
        if high.map_or(true, |(_, s)| sub_score > s) {
            high = Some((source, sub_score));
        }
        if low.map_or(true, |(_, s)| sub_score < s) {
            low = Some((source, sub_score));
        }
    }

    match (high, low) {
        (Some(h), Some(l)) if h.1 > 0.0 && l.1 < 0.0 && h.1 - l.1 > divergence => Some((h, l)),
        _ => None,
    }
}

fn calibrate(completeness: f64, contributions: &[Contribution]) -> f64 {
    let contributing: Vec<f64> = contributions
        .iter()
        .filter(|c| matches!(c.factor, Factor::Source(_)) && c.signed_weight != 0.0)
        .map(|c| c.confidence)
        .collect();
    if contributing.is_empty() {
        return 0.0;
    }
    let mean = contributing.iter().sum::<f64>() / contributing.len() as f64;
    (completeness * mean).clamp(0.0, 1.0)
}

fn summarize(assessment: &RiskAssessment, insufficient: bool) -> String {
    let score = assessment.overall_score();
    let risks = assessment.risk_factors(SUMMARY_FACTORS);
    let positives = assessment.positive_factors(SUMMARY_FACTORS);

    match assessment.risk_level() {
        RiskLevel::High => {
            let mut text = format!("HIGH RISK (score {:.2}): ", score);
            if !risks.is_empty() {
                text.push_str(&format!("{}. ", risks.join("; ")));
            }
            text.push_str("High probability of shell company. Block registration and forward for manual review.");
            text
        }
        RiskLevel::Medium => {
            let mut text = format!("MEDIUM RISK (score {:.2}): ", score);
            if insufficient {
                text.push_str("Not enough evidence was obtained to decide automatically. ");
            } else if assessment.conflicting() {
                text.push_str("High-confidence sources contradict each other. ");
            } else {
                text.push_str("The company may be legitimate, but shows some risk indicators. ");
            }
            if !risks.is_empty() {
                text.push_str(&format!("Risk indicators: {}. ", risks.join("; ")));
            }
            if !positives.is_empty() {
                text.push_str(&format!("Positive points: {}. ", positives.join("; ")));
            }
            text.push_str("Additional document verification recommended.");
            text
        }
        RiskLevel::Low => {
            let mut text = format!("LOW RISK (score {:.2}): Address validated. ", score);
            if !positives.is_empty() {
                text.push_str(&format!(
                    "Adequate infrastructure identified: {}. ",
                    positives.join("; ")
                ));
            }
            text.push_str("Automatic approval recommended.");
            text
        }
    }
}
