use std::sync::Arc;

use crate::services::{
    providers::{InMemoryStore, UserContextStore},
    Collaborators, ContextUpdater, ContextUpdaterHandle, EngineSettings, NarrativeClient,
    RecommendationEngine,
};

/// Bounds for the `limit` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationLimits {
    pub default: usize,
    pub max: usize,
}

impl Default for RecommendationLimits {
    fn default() -> Self {
        Self { default: 6, max: 50 }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub updater: ContextUpdater,
    pub contexts: Arc<dyn UserContextStore>,
    pub limits: RecommendationLimits,
}

impl AppState {
    pub fn new(
        engine: RecommendationEngine,
        updater: ContextUpdater,
        contexts: Arc<dyn UserContextStore>,
        limits: RecommendationLimits,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            updater,
            contexts,
            limits,
        }
    }

    /// State backed entirely by one in-memory store
    ///
    /// Spawns the context updater, so it must be called inside a Tokio runtime.
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        narrative: Arc<dyn NarrativeClient>,
        settings: EngineSettings,
    ) -> (Self, ContextUpdaterHandle) {
        let engine = RecommendationEngine::new(Collaborators::shared(store.clone(), narrative), settings);
        let (updater, handle) = ContextUpdater::spawn(store.clone());
        let state = Self::new(engine, updater, store, RecommendationLimits::default());
        (state, handle)
    }
}
