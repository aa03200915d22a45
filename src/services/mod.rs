pub mod context_builder;
pub mod context_updater;
pub mod fallback;
pub mod features;
pub mod narrative;
pub mod providers;
pub mod recommendations;
pub mod scoring;
pub mod selection;

pub use context_updater::{ContextUpdater, ContextUpdaterHandle};
pub use narrative::{HttpNarrativeClient, NarrativeClient, TemplateNarrativeClient};
pub use recommendations::{Collaborators, EngineSettings, RecommendationEngine};
