//! Process-wide default registry
//!
//! Hosts that want one shared registry without threading it through their own
//! state can install it here. Nothing exists until `init_default_registry` is
//! called, and `reset_default_registry` drops it again. Prefer owning a
//! `ProposalRegistry` value directly wherever that is practical.
//!
//! The default registry buffers pheromones in a `PheromoneOutbox`. Callers
//! must take them with `drain_pheromones` inside `with_default_registry`,
//! otherwise they accumulate until reset discards them.

use crate::config::GovernanceConfig;
use crate::error::AppError;
use crate::governance::registry::ProposalRegistry;
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

static DEFAULT_REGISTRY: Lazy<Mutex<Option<ProposalRegistry>>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, Option<ProposalRegistry>> {
    // poisoned locks are recovered
    DEFAULT_REGISTRY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the default registry. Fails if one is already installed.
pub fn init_default_registry(config: &GovernanceConfig) -> Result<(), AppError> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(AppError::Conflict(
            "Default proposal registry is already initialized".to_string(),
        ));
    }
    *slot = Some(ProposalRegistry::new(config));
    info!("Default proposal registry initialized");
    Ok(())
}

/// Run `f` against the default registry while holding its lock
pub fn with_default_registry<T>(f: impl FnOnce(&mut ProposalRegistry) -> T) -> Result<T, AppError> {
    let mut slot = slot();
    let registry = slot.as_mut().ok_or_else(|| {
        AppError::Internal("Default proposal registry used before initialization".to_string())
    })?;
    Ok(f(registry))
}

/// Drop the default registry; returns whether one was installed
pub fn reset_default_registry() -> bool {
    let Some(mut registry) = slot().take() else {
        return false;
    };
    let undelivered = registry.drain_pheromones().len();
    if undelivered > 0 {
        warn!("Default proposal registry reset with {} undelivered pheromone(s)", undelivered);
    }
    info!("Default proposal registry reset");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::proposal::ProposalPhase;
    use crate::governance::spec::{RawProposalSpec, ResourceMeta};
    use serde_json::json;

    // One test owns the whole lifecycle so parallel tests never race on the static
    #[test]
    fn test_default_registry_lifecycle() {
        reset_default_registry();
        assert!(matches!(
            with_default_registry(|r| r.len()),
            Err(AppError::Internal(_))
        ));

        init_default_registry(&GovernanceConfig::default()).unwrap();
        assert!(matches!(
            init_default_registry(&GovernanceConfig::default()),
            Err(AppError::Conflict(_))
        ));

        let raw = RawProposalSpec::from_value(json!({
            "changeType": "CODE_PATCH",
            "target": { "kind": "Module", "name": "parser" },
            "proposer": "agent-k",
            "reviewRequirements": { "autoMerge": true, "requiredApprovers": 0 }
        }))
        .unwrap();
        let phase = with_default_registry(|r| {
            r.create(&ResourceMeta::new("global", None), &raw)
                .map(|p| p.phase)
        })
        .unwrap()
        .unwrap();
        assert_eq!(phase, ProposalPhase::Approved);

        let emitted = with_default_registry(|r| r.drain_pheromones()).unwrap();
        assert_eq!(emitted.len(), 1);
        assert!(with_default_registry(|r| r.drain_pheromones().is_empty()).unwrap());

        assert!(reset_default_registry());
        assert!(!reset_default_registry());
        assert!(with_default_registry(|r| r.len()).is_err());
    }
}
