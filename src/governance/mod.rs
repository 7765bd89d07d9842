//! Proposal Risk & Governance Engine
//!
//! Decides whether a proposed change to a running multi-agent system may
//! proceed automatically, needs review, or must be blocked:
//!
//! 1. **Spec**: ingest CRD-shaped input into a typed `ProposalSpec`
//! 2. **Risk**: score it (base × magnitude × test coverage + velocity)
//! 3. **Registry**: create the proposal, auto-approve or open review
//! 4. **Pheromone**: notify the external reviewer/validator
//!
//! Reviewers then approve, reject or merge; a periodic sweep expires stale
//! proposals.

pub mod default;
pub mod pheromone;
pub mod proposal;
pub mod registry;
pub mod risk;
pub mod spec;
pub mod velocity;

// Re-export main types for convenient access
pub use pheromone::{PheromoneEmitter, PheromoneOutbox, PheromoneRecord, PheromoneSink};
pub use proposal::{Proposal, ProposalPhase, ReviewRecord, ValidationResult, ValidationState};
pub use registry::ProposalRegistry;
pub use risk::{RiskAssessment, RiskLevel, RiskModel};
pub use spec::{parse_proposal_spec, ChangeType, ProposalSpec, RawProposalSpec, ResourceMeta};
pub use velocity::VelocityTracker;
