//! Risk Model
//!
//! Scores a proposal from its declared attributes. The score is a product of
//! three factors plus an additive velocity surcharge, clamped into [0, 1]:
//!
//! ```text
//! cumulative = clamp(base × magnitude × test_coverage + velocity, 0, 1)
//! ```
//!
//! Everything here is pure. Out-of-range inputs are clamped, never rejected.

use crate::governance::spec::{ChangeType, ProposalSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base risk for change types the model does not know
pub const UNKNOWN_BASE_RISK: f64 = 0.5;

/// Weight of one changed file, in changed lines
pub const LINES_PER_FILE: f64 = 10.0;

/// Divisor of the square-root magnitude term
const MAGNITUDE_SCALE: f64 = 20.0;

/// Risk reduction per net test added
const TEST_COVERAGE_STEP: f64 = 0.02;

const MIN_TEST_COVERAGE_FACTOR: f64 = 0.5;
const MAX_TEST_COVERAGE_FACTOR: f64 = 1.5;

// =============================================================================
// RISK LEVEL
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Below 0.3
    Low,
    /// 0.3 up to 0.6
    Medium,
    /// 0.6 up to 0.9
    High,
    /// 0.9 and above
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.9 => RiskLevel::Critical,
            s if s >= 0.6 => RiskLevel::High,
            s if s >= 0.3 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RISK ASSESSMENT
// =============================================================================

/// One evaluation of a proposal's risk, computed fresh each time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub base_risk: f64,
    pub magnitude_factor: f64,
    pub test_coverage_factor: f64,
    pub velocity_penalty: f64,
    /// Published result, always within [0, 1]
    pub cumulative_risk: f64,
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    /// Whether the assessment fits a proposer-declared risk budget
    pub fn within_budget(&self, max_cumulative_risk: f64) -> bool {
        self.cumulative_risk <= max_cumulative_risk
    }
}

// =============================================================================
// RISK MODEL
// =============================================================================

/// Stateless multi-factor risk scoring
pub struct RiskModel;

impl RiskModel {
    /// Score a proposal given the registry's current velocity penalty
    pub fn calculate_risk(spec: &ProposalSpec, velocity_penalty: f64) -> RiskAssessment {
        let base_risk = Self::base_risk(&spec.change_type);
        let magnitude_factor = Self::calculate_magnitude_factor(
            spec.lines_added,
            spec.lines_removed,
            spec.files_changed,
        );
        let test_coverage_factor =
            Self::calculate_test_coverage_factor(spec.tests_added, spec.tests_removed);
        let velocity_penalty = sanitize(velocity_penalty);

        let cumulative_risk = sanitize(
            base_risk * magnitude_factor * test_coverage_factor + velocity_penalty,
        )
        .min(1.0);

        RiskAssessment {
            base_risk,
            magnitude_factor,
            test_coverage_factor,
            velocity_penalty,
            cumulative_risk,
            risk_level: Self::get_risk_level(cumulative_risk),
        }
    }

    /// Static per-type base risk; unknown types are moderate, never free
    pub fn base_risk(change_type: &ChangeType) -> f64 {
        match change_type {
            ChangeType::CodePatch => 0.1,
            ChangeType::CodeRefactor => 0.2,
            ChangeType::CodeFeature => 0.3,
            ChangeType::ConfigChange => 0.3,
            ChangeType::AgentSpawn => 0.4,
            ChangeType::CodeDelete => 0.5,
            ChangeType::AgentUpgrade => 0.5,
            ChangeType::AgentDelete => 0.7,
            ChangeType::MemoryDelete => 0.8,
            ChangeType::PolicyOverride => 0.85,
            ChangeType::RiskOverride => 0.9,
            ChangeType::Other(_) => UNKNOWN_BASE_RISK,
        }
    }

    /// `1 + sqrt(lines_added + lines_removed + 10·files_changed) / 20`
    ///
    /// Exactly 1.0 for an empty change; one file weighs as much as ten lines.
    pub fn calculate_magnitude_factor(
        lines_added: u64,
        lines_removed: u64,
        files_changed: u64,
    ) -> f64 {
        let weighted = lines_added as f64 + lines_removed as f64 + LINES_PER_FILE * files_changed as f64;
        1.0 + weighted.sqrt() / MAGNITUDE_SCALE
    }

    /// `clamp(1 − 0.02·(tests_added − tests_removed), 0.5, 1.5)`
    pub fn calculate_test_coverage_factor(tests_added: u64, tests_removed: u64) -> f64 {
        let net = tests_added as f64 - tests_removed as f64;
        (1.0 - TEST_COVERAGE_STEP * net).clamp(MIN_TEST_COVERAGE_FACTOR, MAX_TEST_COVERAGE_FACTOR)
    }

    pub fn get_risk_level(score: f64) -> RiskLevel {
        RiskLevel::from_score(score)
    }
}

/// NaN and negatives collapse to zero
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}
