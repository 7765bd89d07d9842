//! Data models and DTOs (Data Transfer Objects)
//!
//! Request/response structures used by the HTTP host.

use crate::governance::{Proposal, ProposalPhase, RawProposalSpec, ResourceMeta, ValidationResult};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Message-only response (no data)
#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// CRD-shaped submission: `{ metadata: {name, namespace}, spec: {...} }`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub metadata: ResourceMeta,
    pub spec: RawProposalSpec,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[validate(length(min = 1, message = "Approver is required"))]
    pub approver: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[validate(length(min = 1, message = "Executor is required"))]
    pub executor: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub result: ValidationResult,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecayRequest {
    #[validate(range(min = 0.0, message = "Hours must not be negative"))]
    pub hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProposalListQuery {
    pub namespace: Option<String>,
}

// =============================================================================
// RESPONSES
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub proposal: Proposal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListResponse {
    pub proposals: Vec<Proposal>,
    pub total: usize,
}

/// Outcome of approve/reject/merge/validation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub accepted: bool,
    pub phase: ProposalPhase,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryResponse {
    pub expired: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityResponse {
    pub velocity_penalty: f64,
    pub auto_merge_threshold: f64,
}
