//! Proposal registry
//!
//! Owns every proposal and the single velocity tracker. All mutation of a
//! proposal goes through here: creation, review decisions, merges, validator
//! verdicts and the expiry sweep. Callers only ever get shared references.

use crate::config::GovernanceConfig;
use crate::error::AppError;
use crate::governance::pheromone::{PheromoneEmitter, PheromoneOutbox, PheromoneRecord, PheromoneSink};
use crate::governance::proposal::{Proposal, ProposalPhase, ValidationResult};
use crate::governance::risk::RiskModel;
use crate::governance::spec::{parse_proposal_spec, RawProposalSpec, ResourceMeta};
use crate::governance::velocity::VelocityTracker;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct ProposalRegistry<S: PheromoneSink = PheromoneOutbox> {
    proposals: HashMap<String, Proposal>,
    velocity: VelocityTracker,
    auto_merge_threshold: f64,
    sink: S,
}

impl ProposalRegistry<PheromoneOutbox> {
    pub fn new(config: &GovernanceConfig) -> Self {
        Self::with_sink(config, PheromoneOutbox::new())
    }

    /// Take every pheromone emitted since the last drain
    pub fn drain_pheromones(&mut self) -> Vec<PheromoneRecord> {
        self.sink.drain()
    }
}

impl Default for ProposalRegistry<PheromoneOutbox> {
    fn default() -> Self {
        Self::new(&GovernanceConfig::default())
    }
}

impl<S: PheromoneSink> ProposalRegistry<S> {
    pub fn with_sink(config: &GovernanceConfig, sink: S) -> Self {
        Self {
            proposals: HashMap::new(),
            velocity: VelocityTracker::new(
                config.velocity_increment,
                config.velocity_half_life_hours,
            ),
            auto_merge_threshold: config.auto_merge_threshold,
            sink,
        }
    }

    pub fn auto_merge_threshold(&self) -> f64 {
        self.auto_merge_threshold
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Parse, score and register a new proposal
    pub fn create(
        &mut self,
        meta: &ResourceMeta,
        spec: &RawProposalSpec,
    ) -> Result<&Proposal, AppError> {
        self.create_at(meta, spec, Utc::now())
    }

    pub fn create_at(
        &mut self,
        meta: &ResourceMeta,
        spec: &RawProposalSpec,
        now: DateTime<Utc>,
    ) -> Result<&Proposal, AppError> {
        let spec = parse_proposal_spec(spec, meta)?;
        if self.proposals.contains_key(&spec.name) {
            return Err(AppError::Conflict(format!(
                "Proposal '{}' already exists",
                spec.name
            )));
        }

        self.velocity.record_event_at(now);
        let velocity_penalty = self.velocity.penalty_at(now);
        let risk = RiskModel::calculate_risk(&spec, velocity_penalty);

        if !risk.within_budget(spec.max_cumulative_risk) {
            warn!(
                "⚠️  Proposal {} exceeds its risk budget: {:.2} > {:.2}",
                spec.name, risk.cumulative_risk, spec.max_cumulative_risk
            );
        }

        let auto_merge = spec.auto_merge
            && spec.required_approvers == 0
            && !spec.t_gent_validation
            && risk.cumulative_risk <= self.auto_merge_threshold;

        let mut proposal = Proposal::new(spec, Some(risk.clone()), now);
        if auto_merge {
            proposal.auto_approve();
        } else {
            proposal.open_review();
        }

        info!(
            "📝 Created proposal {}/{}: type={}, risk={:.3} ({}), velocity={:.3}, phase={}",
            proposal.namespace,
            proposal.name,
            proposal.spec.change_type,
            risk.cumulative_risk,
            risk.risk_level,
            velocity_penalty,
            proposal.phase
        );

        self.sink.emit(PheromoneEmitter::generate_review_pheromone(
            &proposal.name,
            &proposal.namespace,
            &proposal.spec,
            &risk,
            proposal.phase,
        ));

        let name = proposal.name.clone();
        Ok(self.proposals.entry(name).or_insert(proposal))
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    pub fn get(&self, name: &str) -> Option<&Proposal> {
        self.proposals.get(name)
    }

    /// Proposals ordered by creation time, optionally filtered by namespace
    pub fn list(&self, namespace: Option<&str>) -> Vec<&Proposal> {
        let mut proposals: Vec<&Proposal> = self
            .proposals
            .values()
            .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
            .collect();
        proposals.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        proposals
    }

    pub fn delete(&mut self, name: &str) -> bool {
        let removed = self.proposals.remove(name).is_some();
        if removed {
            info!("🗑️  Deleted proposal {}", name);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    // =========================================================================
    // DECISIONS
    // =========================================================================

    pub fn approve(&mut self, name: &str, approver: &str, rationale: Option<String>) -> bool {
        let Some(proposal) = self.proposals.get_mut(name) else {
            return false;
        };
        let accepted = proposal.approve(approver, rationale);
        log_transition("approve", name, approver, accepted, proposal.phase);
        accepted
    }

    pub fn reject(&mut self, name: &str, approver: &str, rationale: Option<String>) -> bool {
        let Some(proposal) = self.proposals.get_mut(name) else {
            return false;
        };
        let accepted = proposal.reject(approver, rationale);
        log_transition("reject", name, approver, accepted, proposal.phase);
        accepted
    }

    pub fn merge(&mut self, name: &str, executor: &str) -> bool {
        let Some(proposal) = self.proposals.get_mut(name) else {
            return false;
        };
        let accepted = proposal.merge(executor);
        log_transition("merge", name, executor, accepted, proposal.phase);
        accepted
    }

    /// Deliver the external validator's verdict
    pub fn record_validation(&mut self, name: &str, result: ValidationResult) -> bool {
        let Some(proposal) = self.proposals.get_mut(name) else {
            return false;
        };
        let accepted = proposal.record_validation(result);
        log_transition("validation", name, "t-gent", accepted, proposal.phase);
        accepted
    }

    /// Move every proposal whose ttl has run out to `EXPIRED`
    pub fn expire_proposals(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .proposals
            .values_mut()
            .filter_map(|p| p.expire(now).then(|| p.name.clone()))
            .collect();
        expired.sort();

        if expired.is_empty() {
            debug!("Expiry sweep found nothing to expire");
        } else {
            info!("⏰ Expired {} proposal(s): {}", expired.len(), expired.join(", "));
        }
        expired
    }

    // =========================================================================
    // VELOCITY
    // =========================================================================

    pub fn get_velocity_penalty(&self) -> f64 {
        self.velocity.penalty()
    }

    pub fn decay_velocity(&mut self, hours: f64) {
        self.velocity.decay(hours);
        debug!("Velocity decayed by {}h to {:.4}", hours, self.velocity.penalty());
    }

    pub fn reset_velocity(&mut self) {
        self.velocity.reset();
        info!("Velocity tracker reset");
    }
}

fn log_transition(action: &str, name: &str, actor: &str, accepted: bool, phase: ProposalPhase) {
    if accepted {
        info!("✅ {} on {} by {} accepted, phase={}", action, name, actor, phase);
    } else {
        debug!("{} on {} by {} refused in phase {}", action, name, actor, phase);
    }
}
