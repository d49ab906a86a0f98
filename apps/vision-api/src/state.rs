//! Application state management

use domain_vision::{
    InMemorySessionStore, InMemoryUsageRecorder, VisionOrchestrator, VisionState,
    provider::provider_from_env,
};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    /// Concrete store, kept so main can spawn its sweeper
    pub sessions: InMemorySessionStore,
    pub vision: VisionState,
}

impl AppState {
    /// Wire the provider selected by config, the session store and the usage counters.
    pub fn new(config: crate::config::Config) -> Self {
        let provider = provider_from_env(config.provider);
        let usage = Arc::new(InMemoryUsageRecorder::new());
        let orchestrator = VisionOrchestrator::new(provider, usage.clone(), config.orchestrator);
        let sessions = InMemorySessionStore::new(config.sessions);

        let vision = VisionState {
            orchestrator,
            sessions: Arc::new(sessions.clone()),
            usage,
        };

        Self {
            config,
            sessions,
            vision,
        }
    }
}
