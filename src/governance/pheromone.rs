//! Pheromone emission
//!
//! Turns a freshly assessed proposal into a CRD-shaped `Pheromone` record for
//! the external reviewer/validator. Building the record is pure; delivery goes
//! through a `PheromoneSink` and must never block the caller.

use crate::governance::proposal::ProposalPhase;
use crate::governance::risk::RiskAssessment;
use crate::governance::spec::ProposalSpec;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

pub const PHEROMONE_KIND: &str = "Pheromone";

/// Intensity of a zero-risk proposal; full risk maps to 1.0
const MIN_INTENSITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PheromoneType {
    Intent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PheromoneMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PheromoneSpec {
    #[serde(rename = "type")]
    pub pheromone_type: PheromoneType,
    pub payload: String,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PheromoneRecord {
    pub kind: String,
    pub metadata: PheromoneMetadata,
    pub spec: PheromoneSpec,
}

pub struct PheromoneEmitter;

impl PheromoneEmitter {
    /// Build the notice for a proposal in its initial `phase`
    pub fn generate_review_pheromone(
        name: &str,
        namespace: &str,
        spec: &ProposalSpec,
        risk: &RiskAssessment,
        phase: ProposalPhase,
    ) -> PheromoneRecord {
        let headline = match phase {
            ProposalPhase::Approved => "Auto-approved proposal",
            _ => "Review requested for proposal",
        };
        let mut payload = format!(
            "{} '{}': {} on {}/{} by {} (risk {} at {:.2})",
            headline,
            name,
            spec.change_type,
            spec.target_kind,
            spec.target_name,
            spec.proposer,
            risk.risk_level,
            risk.cumulative_risk,
        );
        if !risk.within_budget(spec.max_cumulative_risk) {
            payload.push_str(&format!(
                "; exceeds declared risk budget {:.2}",
                spec.max_cumulative_risk
            ));
        }
        if spec.change_type.is_destructive() {
            payload.push_str("; destructive change");
        }
        if spec.t_gent_validation {
            payload.push_str("; T-gent validation requested");
        }

        PheromoneRecord {
            kind: PHEROMONE_KIND.to_string(),
            metadata: PheromoneMetadata {
                name: format!("review-{}", name),
                namespace: namespace.to_string(),
            },
            spec: PheromoneSpec {
                pheromone_type: PheromoneType::Intent,
                payload,
                intensity: Self::intensity(risk.cumulative_risk),
            },
        }
    }

    /// Strictly increasing in risk over [0, 1]
    pub fn intensity(cumulative_risk: f64) -> f64 {
        let risk = if cumulative_risk.is_nan() {
            0.0
        } else {
            cumulative_risk.clamp(0.0, 1.0)
        };
        MIN_INTENSITY + (1.0 - MIN_INTENSITY) * risk
    }
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Fire-and-forget handoff to whatever carries pheromones onward
pub trait PheromoneSink: Send + Sync {
    fn emit(&mut self, record: PheromoneRecord);
}

/// Buffers records until the owner drains them
#[derive(Debug, Default)]
pub struct PheromoneOutbox {
    records: Vec<PheromoneRecord>,
}

impl PheromoneOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<PheromoneRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PheromoneSink for PheromoneOutbox {
    fn emit(&mut self, record: PheromoneRecord) {
        self.records.push(record);
    }
}

impl PheromoneSink for UnboundedSender<PheromoneRecord> {
    fn emit(&mut self, record: PheromoneRecord) {
        if let Err(e) = self.send(record) {
            warn!("Pheromone receiver dropped, discarding {}", e.0.metadata.name);
        }
    }
}
