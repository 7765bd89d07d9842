//! Proposal Risk & Governance Engine
//!
//! Decides whether a proposed change to a running multi-agent system (a code
//! patch, an agent upgrade, a memory deletion, a policy override) may proceed
//! automatically, needs review, or must be blocked.
//!
//! The engine itself lives in [`governance`] and is synchronous. The remaining
//! modules make up the operator host: configuration, the HTTP surface and the
//! shared state it runs on.

pub mod config;
pub mod error;
pub mod governance;
pub mod models;
pub mod routes;
pub mod state;

pub use error::{ApiResult, AppError};
pub use governance::{
    parse_proposal_spec, ProposalRegistry, ProposalSpec, RawProposalSpec, ResourceMeta,
    RiskAssessment, RiskModel,
};
