//! Proposal Routes
//!
//! HTTP endpoints over the shared proposal registry. Callers are assumed to be
//! authenticated already.

use crate::error::{not_found_error, ApiResult};
use crate::models::{
    CreateProposalRequest, DecayRequest, ExpiryResponse, MergeRequest, MessageResponse,
    ProposalListQuery, ProposalListResponse, ProposalResponse, ReviewRequest, SuccessResponse,
    TransitionResponse, ValidationRequest, VelocityResponse,
};
use crate::state::{HostRegistry, SharedState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::debug;
use validator::Validate;

// =============================================================================
// CRUD
// =============================================================================

/// Submit a new proposal
pub async fn create_proposal(
    State(state): State<SharedState>,
    Json(payload): Json<CreateProposalRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<ProposalResponse>>)> {
    let mut registry = state.registry.write().await;
    let proposal = registry.create(&payload.metadata, &payload.spec)?.clone();

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            format!("Proposal {} created in phase {}", proposal.name, proposal.phase),
            ProposalResponse { proposal },
        )),
    ))
}

/// List proposals, optionally filtered by namespace
pub async fn list_proposals(
    State(state): State<SharedState>,
    Query(query): Query<ProposalListQuery>,
) -> ApiResult<Json<SuccessResponse<ProposalListResponse>>> {
    let registry = state.registry.read().await;
    let proposals: Vec<_> = registry
        .list(query.namespace.as_deref())
        .into_iter()
        .cloned()
        .collect();
    let total = proposals.len();

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} proposal(s)", total),
        ProposalListResponse { proposals, total },
    )))
}

pub async fn get_proposal(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse<ProposalResponse>>> {
    let registry = state.registry.read().await;
    let proposal = registry
        .get(&name)
        .cloned()
        .ok_or_else(|| not_found_error(format!("Proposal {} not found", name)))?;

    Ok(Json(SuccessResponse::with_data(
        "Proposal retrieved",
        ProposalResponse { proposal },
    )))
}

pub async fn delete_proposal(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let mut registry = state.registry.write().await;
    if !registry.delete(&name) {
        return Err(not_found_error(format!("Proposal {} not found", name)));
    }
    Ok(Json(MessageResponse::new(format!("Proposal {} deleted", name))))
}

// =============================================================================
// DECISIONS
// =============================================================================

/// Apply a transition to a known proposal and report the resulting phase
async fn transition(
    state: &SharedState,
    name: &str,
    apply: impl FnOnce(&mut HostRegistry) -> bool,
) -> ApiResult<Json<TransitionResponse>> {
    let mut registry = state.registry.write().await;
    if registry.get(name).is_none() {
        return Err(not_found_error(format!("Proposal {} not found", name)));
    }

    let accepted = apply(&mut *registry);
    let phase = registry
        .get(name)
        .map(|p| p.phase)
        .ok_or_else(|| not_found_error(format!("Proposal {} not found", name)))?;

    Ok(Json(TransitionResponse { accepted, phase }))
}

pub async fn approve_proposal(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    payload.validate()?;
    transition(&state, &name, |registry| {
        registry.approve(&name, &payload.approver, payload.rationale.clone())
    })
    .await
}

pub async fn reject_proposal(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    payload.validate()?;
    transition(&state, &name, |registry| {
        registry.reject(&name, &payload.approver, payload.rationale.clone())
    })
    .await
}

pub async fn merge_proposal(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<MergeRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    payload.validate()?;
    transition(&state, &name, |registry| registry.merge(&name, &payload.executor)).await
}

/// Intake for the external T-gent validator
pub async fn record_validation(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<ValidationRequest>,
) -> ApiResult<Json<TransitionResponse>> {
    transition(&state, &name, |registry| {
        registry.record_validation(&name, payload.result)
    })
    .await
}

/// Run an expiry sweep immediately
pub async fn expire_proposals(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ExpiryResponse>>> {
    let mut registry = state.registry.write().await;
    let expired = registry.expire_proposals(Utc::now());
    debug!("Manual expiry sweep expired {}", expired.len());

    Ok(Json(SuccessResponse::with_data(
        format!("Expired {} proposal(s)", expired.len()),
        ExpiryResponse { expired },
    )))
}

// =============================================================================
// VELOCITY
// =============================================================================

fn velocity_snapshot(registry: &HostRegistry) -> VelocityResponse {
    VelocityResponse {
        velocity_penalty: registry.get_velocity_penalty(),
        auto_merge_threshold: registry.auto_merge_threshold(),
    }
}

pub async fn get_velocity(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<VelocityResponse>>> {
    let registry = state.registry.read().await;
    Ok(Json(SuccessResponse::with_data(
        "Current velocity penalty",
        velocity_snapshot(&registry),
    )))
}

pub async fn decay_velocity(
    State(state): State<SharedState>,
    Json(payload): Json<DecayRequest>,
) -> ApiResult<Json<SuccessResponse<VelocityResponse>>> {
    payload.validate()?;
    let mut registry = state.registry.write().await;
    registry.decay_velocity(payload.hours);
    Ok(Json(SuccessResponse::with_data(
        format!("Velocity decayed by {}h", payload.hours),
        velocity_snapshot(&registry),
    )))
}

pub async fn reset_velocity(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<VelocityResponse>>> {
    let mut registry = state.registry.write().await;
    registry.reset_velocity();
    Ok(Json(SuccessResponse::with_data(
        "Velocity reset",
        velocity_snapshot(&registry),
    )))
}
