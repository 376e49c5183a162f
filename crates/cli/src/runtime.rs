//! Wiring shared by the commands: config → robots → router → orchestrator.

use std::sync::Arc;

use botrelay_agent::{MessageOrchestrator, RobotRegistry, Router};
use botrelay_config::AppConfig;
use botrelay_core::event::EventBus;
use botrelay_store::InMemoryConversationStore;
use botrelay_tools::CatalogDeps;
use tracing::debug;

pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<InMemoryConversationStore>,
    pub events: Arc<EventBus>,
    pub orchestrator: MessageOrchestrator,
}

impl Runtime {
    /// Load the config and build everything from the process environment.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Self::build(config, |key| std::env::var(key).ok())
    }

    pub fn build(
        config: AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let events = Arc::new(EventBus::default());
        let registry =
            RobotRegistry::from_config(&config, &CatalogDeps::from_env(), events.clone(), lookup)?;
        let router = Router::from_config(&config.routing, registry)?;
        let store = Arc::new(InMemoryConversationStore::new());
        let orchestrator = MessageOrchestrator::new(router, store.clone(), events.clone())
            .with_history_limit(config.history_limit);
        debug!(
            history_limit = config.history_limit,
            max_tool_rounds = config.max_tool_rounds,
            "Runtime ready"
        );
        Ok(Self {
            config,
            store,
            events,
            orchestrator,
        })
    }
}
