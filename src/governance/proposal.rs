//! Proposal state machine
//!
//! ```text
//! PENDING ──► REVIEWING ──► APPROVED ──► MERGED
//!    │            │
//!    │            ├──► REJECTED
//!    └────────────┴──► EXPIRED   (ttl elapsed)
//! PENDING ──► APPROVED           (auto-merge path)
//! ```
//!
//! Transitions never fail loudly. A call made in the wrong phase returns
//! `false` and leaves the proposal untouched.

use crate::governance::risk::RiskAssessment;
use crate::governance::spec::ProposalSpec;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalPhase {
    /// Only exists while the registry is constructing the proposal
    Pending,
    Reviewing,
    Approved,
    Rejected,
    Merged,
    Expired,
}

impl ProposalPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalPhase::Merged | ProposalPhase::Rejected | ProposalPhase::Expired
        )
    }

    /// Phases in which the ttl still applies
    pub fn can_expire(&self) -> bool {
        matches!(self, ProposalPhase::Pending | ProposalPhase::Reviewing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalPhase::Pending => "PENDING",
            ProposalPhase::Reviewing => "REVIEWING",
            ProposalPhase::Approved => "APPROVED",
            ProposalPhase::Rejected => "REJECTED",
            ProposalPhase::Merged => "MERGED",
            ProposalPhase::Expired => "EXPIRED",
        }
    }
}

impl Default for ProposalPhase {
    fn default() -> Self {
        ProposalPhase::Pending
    }
}

impl fmt::Display for ProposalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of the external T-gent validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationResult {
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationState {
    pub requested: bool,
    pub result: ValidationResult,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            requested: false,
            result: ValidationResult::Pending,
        }
    }
}

/// One approval or rejection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: Uuid,
    pub approver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub at: DateTime<Utc>,
}

impl ReviewRecord {
    fn new(approver: &str, rationale: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            approver: approver.to_string(),
            rationale,
            at: Utc::now(),
        }
    }
}

/// A request to change agent or system state, gated by risk review
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub name: String,
    pub namespace: String,
    pub spec: ProposalSpec,
    pub spec_checksum: String,
    pub risk: Option<RiskAssessment>,
    pub phase: ProposalPhase,
    pub approvals: Vec<ReviewRecord>,
    pub rejections: Vec<ReviewRecord>,
    pub t_gent_validation: ValidationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// Create a proposal in `PENDING`; the registry decides where it goes next
    pub fn new(spec: ProposalSpec, risk: Option<RiskAssessment>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            spec_checksum: spec.fingerprint(),
            spec,
            risk,
            phase: ProposalPhase::Pending,
            approvals: Vec::new(),
            rejections: Vec::new(),
            t_gent_validation: ValidationState::default(),
            created_at,
            updated_at: created_at,
            merged_by: None,
            merged_at: None,
        }
    }

    /// Skip review entirely
    pub(crate) fn auto_approve(&mut self) {
        if self.phase == ProposalPhase::Pending {
            self.phase = ProposalPhase::Approved;
            self.touch();
        }
    }

    /// Open for review, requesting T-gent validation when the proposal requires it
    pub(crate) fn open_review(&mut self) {
        if self.phase != ProposalPhase::Pending {
            return;
        }
        if self.spec.t_gent_validation {
            self.t_gent_validation = ValidationState {
                requested: true,
                result: ValidationResult::Pending,
            };
        }
        self.phase = ProposalPhase::Reviewing;
        self.touch();
    }

    /// Record an approval. Returns `true` whenever the approval was recorded,
    /// whether or not it completed the threshold.
    pub fn approve(&mut self, approver: &str, rationale: Option<String>) -> bool {
        if self.phase != ProposalPhase::Reviewing {
            return false;
        }
        self.approvals.push(ReviewRecord::new(approver, rationale));
        self.touch();
        self.promote_if_ready();
        true
    }

    /// A single rejection vetoes the proposal
    pub fn reject(&mut self, approver: &str, rationale: Option<String>) -> bool {
        if self.phase != ProposalPhase::Reviewing {
            return false;
        }
        self.rejections.push(ReviewRecord::new(approver, rationale));
        self.phase = ProposalPhase::Rejected;
        self.touch();
        true
    }

    pub fn merge(&mut self, executor: &str) -> bool {
        if self.phase != ProposalPhase::Approved {
            return false;
        }
        let now = Utc::now();
        self.phase = ProposalPhase::Merged;
        self.merged_by = Some(executor.to_string());
        self.merged_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Accept the T-gent verdict. Only a requested, still pending validation
    /// on a proposal under review can be settled.
    pub fn record_validation(&mut self, result: ValidationResult) -> bool {
        if self.phase != ProposalPhase::Reviewing
            || !self.t_gent_validation.requested
            || self.t_gent_validation.result != ValidationResult::Pending
            || result == ValidationResult::Pending
        {
            return false;
        }
        self.t_gent_validation.result = result;
        self.touch();
        self.promote_if_ready();
        true
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.phase.can_expire() && now - self.created_at > self.ttl()
    }

    pub(crate) fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        self.phase = ProposalPhase::Expired;
        self.updated_at = now;
        true
    }

    pub fn distinct_approvers(&self) -> usize {
        self.approvals
            .iter()
            .map(|a| a.approver.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn validation_satisfied(&self) -> bool {
        !self.spec.t_gent_validation || self.t_gent_validation.result == ValidationResult::Passed
    }

    /// Saturates at the latest representable instant for very long ttls
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(self.ttl())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn ttl(&self) -> Duration {
        i64::try_from(self.spec.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    fn promote_if_ready(&mut self) {
        if self.phase == ProposalPhase::Reviewing
            && self.distinct_approvers() >= self.spec.required_approvers as usize
            && self.validation_satisfied()
        {
            self.phase = ProposalPhase::Approved;
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
