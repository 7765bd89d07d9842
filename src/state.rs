//! Application state management
//!
//! Contains shared state accessible across all handlers. The registry sits
//! behind a single lock so every proposal mutation and every velocity update
//! is serialized.

use crate::config::Settings;
use crate::governance::{PheromoneRecord, ProposalRegistry};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

/// Registry whose pheromones are handed to a channel
pub type HostRegistry = ProposalRegistry<UnboundedSender<PheromoneRecord>>;

/// Application state shared across all handlers
pub struct AppState {
    /// Proposal registry (has one lock for proposals and velocity)
    pub registry: RwLock<HostRegistry>,

    /// Loaded settings
    pub settings: Settings,
}

impl AppState {
    /// Build the state plus the receiving end of the pheromone channel
    pub fn new(settings: Settings) -> (Self, UnboundedReceiver<PheromoneRecord>) {
        let (tx, rx) = unbounded_channel();
        let registry = ProposalRegistry::with_sink(&settings.governance, tx);
        (
            Self {
                registry: RwLock::new(registry),
                settings,
            },
            rx,
        )
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
