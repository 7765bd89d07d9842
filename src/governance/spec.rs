//! Proposal spec ingestion
//!
//! The sole boundary between CRD-shaped input and the typed engine.
//! `parse_proposal_spec` is total over optional fields: anything absent gets a
//! documented default, and only `changeType`, `target` and `proposer` are
//! required.

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_REQUIRED_APPROVERS: u32 = 1;
pub const DEFAULT_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_MAX_CUMULATIVE_RISK: f64 = 0.5;
pub const DEFAULT_VELOCITY_WINDOW: Duration = Duration::from_secs(3600);

static RESOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").expect("resource name pattern is valid")
});

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*([smhd]?)$").expect("duration pattern is valid")
});

// =============================================================================
// CHANGE TYPE
// =============================================================================

/// Kind of change a proposal asks for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeType {
    CodePatch,
    CodeRefactor,
    CodeFeature,
    CodeDelete,
    ConfigChange,
    AgentSpawn,
    AgentUpgrade,
    AgentDelete,
    MemoryDelete,
    PolicyOverride,
    RiskOverride,
    /// Anything the engine does not recognise; scored as moderate risk
    Other(String),
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::CodePatch => "CODE_PATCH",
            ChangeType::CodeRefactor => "CODE_REFACTOR",
            ChangeType::CodeFeature => "CODE_FEATURE",
            ChangeType::CodeDelete => "CODE_DELETE",
            ChangeType::ConfigChange => "CONFIG_CHANGE",
            ChangeType::AgentSpawn => "AGENT_SPAWN",
            ChangeType::AgentUpgrade => "AGENT_UPGRADE",
            ChangeType::AgentDelete => "AGENT_DELETE",
            ChangeType::MemoryDelete => "MEMORY_DELETE",
            ChangeType::PolicyOverride => "POLICY_OVERRIDE",
            ChangeType::RiskOverride => "RISK_OVERRIDE",
            ChangeType::Other(raw) => raw.as_str(),
        }
    }

    /// Destructive changes remove state that cannot be regenerated
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            ChangeType::CodeDelete | ChangeType::AgentDelete | ChangeType::MemoryDelete
        )
    }
}

impl From<&str> for ChangeType {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CODE_PATCH" => ChangeType::CodePatch,
            "CODE_REFACTOR" => ChangeType::CodeRefactor,
            "CODE_FEATURE" => ChangeType::CodeFeature,
            "CODE_DELETE" => ChangeType::CodeDelete,
            "CONFIG_CHANGE" => ChangeType::ConfigChange,
            "AGENT_SPAWN" => ChangeType::AgentSpawn,
            "AGENT_UPGRADE" => ChangeType::AgentUpgrade,
            "AGENT_DELETE" => ChangeType::AgentDelete,
            "MEMORY_DELETE" => ChangeType::MemoryDelete,
            "POLICY_OVERRIDE" => ChangeType::PolicyOverride,
            "RISK_OVERRIDE" => ChangeType::RiskOverride,
            _ => ChangeType::Other(raw.to_string()),
        }
    }
}

impl From<String> for ChangeType {
    fn from(raw: String) -> Self {
        ChangeType::from(raw.as_str())
    }
}

impl From<ChangeType> for String {
    fn from(change_type: ChangeType) -> Self {
        change_type.as_str().to_string()
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TYPED SPEC
// =============================================================================

/// Immutable, validated description of a proposed change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSpec {
    pub name: String,
    pub namespace: String,
    pub change_type: ChangeType,
    pub target_kind: String,
    pub target_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    pub proposer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    // Magnitude
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub tests_added: u64,
    pub tests_removed: u64,

    // Review requirements
    pub auto_merge: bool,
    pub required_approvers: u32,
    pub required_reviewers: Vec<String>,
    pub t_gent_validation: bool,

    // Risk budget
    pub max_cumulative_risk: f64,
    pub velocity_window: Duration,

    pub ttl_seconds: u64,
}

impl ProposalSpec {
    /// Stable SHA-256 digest over the fields that define the change
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}/{}", self.namespace, self.name).as_bytes());
        hasher.update(self.change_type.as_str().as_bytes());
        hasher.update(
            format!(
                "{}:{}:{}",
                self.target_kind,
                self.target_namespace.as_deref().unwrap_or(""),
                self.target_name
            )
            .as_bytes(),
        );
        hasher.update(self.proposer.as_bytes());
        hasher.update(
            format!(
                "+{}-{}f{}t+{}t-{}",
                self.lines_added,
                self.lines_removed,
                self.files_changed,
                self.tests_added,
                self.tests_removed
            )
            .as_bytes(),
        );
        hasher.update(
            format!(
                "auto={} approvers={} tgent={} ttl={}",
                self.auto_merge, self.required_approvers, self.t_gent_validation, self.ttl_seconds
            )
            .as_bytes(),
        );
        for reviewer in &self.required_reviewers {
            hasher.update(reviewer.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

// =============================================================================
// RAW INGESTION TYPES (CRD shape)
// =============================================================================

/// Object metadata accompanying a raw spec
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    #[validate(length(min = 1, max = 253, message = "metadata.name must be between 1 and 253 characters"))]
    #[validate(custom(function = "validate_resource_name"))]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ResourceMeta {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawTarget {
    #[validate(length(min = 1, message = "target.kind is required"))]
    pub kind: String,
    #[validate(length(min = 1, message = "target.name is required"))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMagnitude {
    pub lines_added: Option<i64>,
    pub lines_removed: Option<i64>,
    pub files_changed: Option<i64>,
    pub tests_added: Option<i64>,
    pub tests_removed: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReviewRequirements {
    pub auto_merge: Option<bool>,
    pub required_approvers: Option<i64>,
    pub required_reviewers: Option<Vec<String>>,
    pub t_gent_validation: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRiskBudget {
    pub max_cumulative_risk: Option<f64>,
    pub velocity_window: Option<String>,
}

/// Untyped proposal spec as it arrives from the CRD layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawProposalSpec {
    #[validate(length(min = 1, message = "changeType must not be empty"))]
    pub change_type: Option<String>,
    #[validate(nested)]
    pub target: Option<RawTarget>,
    #[validate(length(min = 1, message = "proposer must not be empty"))]
    pub proposer: Option<String>,
    pub description: Option<String>,
    pub rationale: Option<String>,
    pub magnitude: Option<RawMagnitude>,
    pub review_requirements: Option<RawReviewRequirements>,
    pub risk_budget: Option<RawRiskBudget>,
    pub ttl_seconds: Option<i64>,
}

impl RawProposalSpec {
    /// Build from an untyped JSON map
    pub fn from_value(value: serde_json::Value) -> Result<Self, AppError> {
        serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Proposal spec is not well-formed: {}", e)))
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Map raw CRD input onto a typed `ProposalSpec`.
///
/// Fails only when `changeType`, `target` or `proposer` is missing, or when a
/// present value is invalid (empty strings, bad resource names, an
/// unparseable `velocityWindow`). Negative counters clamp to zero.
pub fn parse_proposal_spec(
    spec: &RawProposalSpec,
    meta: &ResourceMeta,
) -> Result<ProposalSpec, AppError> {
    let change_type = spec
        .change_type
        .as_deref()
        .ok_or(AppError::MissingField("changeType"))?;
    let target = spec.target.as_ref().ok_or(AppError::MissingField("target"))?;
    let proposer = spec
        .proposer
        .as_deref()
        .ok_or(AppError::MissingField("proposer"))?;

    meta.validate()?;
    spec.validate()?;

    let magnitude = spec.magnitude.clone().unwrap_or_default();
    let review = spec.review_requirements.clone().unwrap_or_default();
    let budget = spec.risk_budget.clone().unwrap_or_default();

    let velocity_window = match budget.velocity_window.as_deref() {
        Some(raw) => parse_duration(raw)?,
        None => DEFAULT_VELOCITY_WINDOW,
    };

    let max_cumulative_risk = budget
        .max_cumulative_risk
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_MAX_CUMULATIVE_RISK);

    let ttl_seconds = spec
        .ttl_seconds
        .filter(|ttl| *ttl > 0)
        .map(|ttl| ttl as u64)
        .unwrap_or(DEFAULT_TTL_SECONDS);

    let required_approvers = review
        .required_approvers
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(DEFAULT_REQUIRED_APPROVERS);

    Ok(ProposalSpec {
        name: meta.name.clone(),
        namespace: meta
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        change_type: ChangeType::from(change_type),
        target_kind: target.kind.clone(),
        target_name: target.name.clone(),
        target_namespace: target.namespace.clone(),
        proposer: proposer.to_string(),
        description: spec.description.clone(),
        rationale: spec.rationale.clone(),
        lines_added: non_negative(magnitude.lines_added),
        lines_removed: non_negative(magnitude.lines_removed),
        files_changed: non_negative(magnitude.files_changed),
        tests_added: non_negative(magnitude.tests_added),
        tests_removed: non_negative(magnitude.tests_removed),
        auto_merge: review.auto_merge.unwrap_or(false),
        required_approvers,
        required_reviewers: review.required_reviewers.unwrap_or_default(),
        t_gent_validation: review.t_gent_validation.unwrap_or(false),
        max_cumulative_risk,
        velocity_window,
        ttl_seconds,
    })
}

fn non_negative(value: Option<i64>) -> u64 {
    value.unwrap_or(0).max(0) as u64
}

/// Parse `"90"`, `"90s"`, `"15m"`, `"1h"` or `"2d"`
pub fn parse_duration(raw: &str) -> Result<Duration, AppError> {
    let invalid = || AppError::Validation(format!("Invalid velocityWindow '{}'", raw));

    let caps = DURATION.captures(raw.trim()).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_secs = match &caps[2] {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return Err(invalid()),
    };

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Validate a DNS-1123 style resource name
fn validate_resource_name(name: &str) -> Result<(), ValidationError> {
    if !RESOURCE_NAME.is_match(name) {
        let mut err = ValidationError::new("invalid_resource_name");
        err.message = Some(
            "metadata.name must consist of lowercase alphanumerics, '-' or '.', and start and end with an alphanumeric"
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn meta() -> ResourceMeta {
        ResourceMeta::new("fix-typo", Some("agents"))
    }

    #[test]
    fn test_full_input_reproduces_every_field() {
        let raw = RawProposalSpec::from_value(json!({
            "changeType": "AGENT_UPGRADE",
            "target": { "kind": "Agent", "name": "planner", "namespace": "core" },
            "proposer": "agent-k",
            "description": "Upgrade planner",
            "rationale": "New reasoning loop",
            "magnitude": {
                "linesAdded": 120, "linesRemoved": 30, "filesChanged": 4,
                "testsAdded": 6, "testsRemoved": 1
            },
            "reviewRequirements": {
                "autoMerge": true, "requiredApprovers": 2,
                "requiredReviewers": ["alice", "bob"], "tGentValidation": true
            },
            "riskBudget": { "maxCumulativeRisk": 0.7, "velocityWindow": "30m" },
            "ttlSeconds": 900
        }))
        .unwrap();

        let spec = parse_proposal_spec(&raw, &meta()).unwrap();

        assert_eq!(
            spec,
            ProposalSpec {
                name: "fix-typo".to_string(),
                namespace: "agents".to_string(),
                change_type: ChangeType::AgentUpgrade,
                target_kind: "Agent".to_string(),
                target_name: "planner".to_string(),
                target_namespace: Some("core".to_string()),
                proposer: "agent-k".to_string(),
                description: Some("Upgrade planner".to_string()),
                rationale: Some("New reasoning loop".to_string()),
                lines_added: 120,
                lines_removed: 30,
                files_changed: 4,
                tests_added: 6,
                tests_removed: 1,
                auto_merge: true,
                required_approvers: 2,
                required_reviewers: vec!["alice".to_string(), "bob".to_string()],
                t_gent_validation: true,
                max_cumulative_risk: 0.7,
                velocity_window: Duration::from_secs(1800),
                ttl_seconds: 900,
            }
        );
    }

    #[test]
    fn test_minimal_input_fills_defaults() {
        let raw = RawProposalSpec::from_value(json!({
            "changeType": "CODE_PATCH",
            "target": { "kind": "Module", "name": "parser" },
            "proposer": "agent-k"
        }))
        .unwrap();

        let spec = parse_proposal_spec(&raw, &ResourceMeta::new("p1", None)).unwrap();

        assert_eq!(spec.namespace, DEFAULT_NAMESPACE);
        assert_eq!(spec.target_namespace, None);
        assert_eq!(spec.description, None);
        assert_eq!(spec.rationale, None);
        assert_eq!(spec.lines_added, 0);
        assert_eq!(spec.lines_removed, 0);
        assert_eq!(spec.files_changed, 0);
        assert_eq!(spec.tests_added, 0);
        assert_eq!(spec.tests_removed, 0);
        assert!(!spec.auto_merge);
        assert_eq!(spec.required_approvers, DEFAULT_REQUIRED_APPROVERS);
        assert!(spec.required_reviewers.is_empty());
        assert!(!spec.t_gent_validation);
        assert_eq!(spec.max_cumulative_risk, DEFAULT_MAX_CUMULATIVE_RISK);
        assert_eq!(spec.velocity_window, DEFAULT_VELOCITY_WINDOW);
        assert_eq!(spec.ttl_seconds, DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn test_missing_required_fields_are_reported() {
        let full = RawProposalSpec {
            change_type: Some("CODE_PATCH".into()),
            target: Some(RawTarget {
                kind: "Module".into(),
                name: "parser".into(),
                namespace: None,
            }),
            proposer: Some("agent-k".into()),
            ..Default::default()
        };

        let mut no_type = full.clone();
        no_type.change_type = None;
        assert!(matches!(
            parse_proposal_spec(&no_type, &meta()),
            Err(AppError::MissingField("changeType"))
        ));

        let mut no_target = full.clone();
        no_target.target = None;
        assert!(matches!(
            parse_proposal_spec(&no_target, &meta()),
            Err(AppError::MissingField("target"))
        ));

        let mut no_proposer = full;
        no_proposer.proposer = None;
        assert!(matches!(
            parse_proposal_spec(&no_proposer, &meta()),
            Err(AppError::MissingField("proposer"))
        ));
    }

    #[test]
    fn test_negative_counts_and_ttl_are_clamped() {
        let raw = RawProposalSpec::from_value(json!({
            "changeType": "CODE_PATCH",
            "target": { "kind": "Module", "name": "parser" },
            "proposer": "agent-k",
            "magnitude": { "linesAdded": -5, "testsRemoved": -2 },
            "reviewRequirements": { "requiredApprovers": -3 },
            "ttlSeconds": 0
        }))
        .unwrap();

        let spec = parse_proposal_spec(&raw, &meta()).unwrap();
        assert_eq!(spec.lines_added, 0);
        assert_eq!(spec.tests_removed, 0);
        assert_eq!(spec.required_approvers, 0);
        assert_eq!(spec.ttl_seconds, DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn test_invalid_resource_name_is_rejected() {
        let raw = RawProposalSpec {
            change_type: Some("CODE_PATCH".into()),
            target: Some(RawTarget {
                kind: "Module".into(),
                name: "parser".into(),
                namespace: None,
            }),
            proposer: Some("agent-k".into()),
            ..Default::default()
        };
        let result = parse_proposal_spec(&raw, &ResourceMeta::new("Not_Valid", None));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_unknown_change_type_round_trips() {
        let change_type = ChangeType::from("QUANTUM_LEAP");
        assert_eq!(change_type, ChangeType::Other("QUANTUM_LEAP".to_string()));
        assert_eq!(change_type.to_string(), "QUANTUM_LEAP");
        assert_eq!(ChangeType::from("memory_delete"), ChangeType::MemoryDelete);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1h").is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let raw = RawProposalSpec::from_value(json!({
            "changeType": "CODE_PATCH",
            "target": { "kind": "Module", "name": "parser" },
            "proposer": "agent-k"
        }))
        .unwrap();
        let a = parse_proposal_spec(&raw, &meta()).unwrap();
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.lines_added = 1;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
