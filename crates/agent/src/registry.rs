//! Robot registry: name to robot, built once from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use botrelay_config::{AppConfig, RobotConfig};
use botrelay_core::error::Result;
use botrelay_core::event::EventBus;
use botrelay_core::robot::Robot;
use botrelay_providers::build_provider;
use botrelay_tools::CatalogDeps;
use tracing::{debug, info};

use crate::llm_robot::LlmRobot;
use crate::loop_runner::ToolLoop;
use crate::parrot::ParrotRobot;

/// Every robot the router may pick, keyed by name.
#[derive(Default, Clone)]
pub struct RobotRegistry {
    robots: BTreeMap<String, Arc<dyn Robot>>,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a robot under its own name, replacing any previous one.
    pub fn register(&mut self, robot: Arc<dyn Robot>) {
        debug!(robot = %robot.name(), "Registered robot");
        self.robots.insert(robot.name().to_string(), robot);
    }

    pub fn with(mut self, robot: Arc<dyn Robot>) -> Self {
        self.register(robot);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Robot>> {
        self.robots.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.robots.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.robots.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Robot>> {
        self.robots.values()
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    /// Build every configured robot.
    ///
    /// Credentials are resolved through `lookup`. A missing one does not
    /// fail here; the robot reports it on its first call.
    pub fn from_config(
        config: &AppConfig,
        deps: &CatalogDeps,
        events: Arc<EventBus>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (name, robot) in &config.robots {
            registry.register(build_robot(name, robot, config, deps, &events, &lookup)?);
        }
        info!(robots = registry.len(), "Robot registry ready");
        Ok(registry)
    }
}

fn build_robot(
    name: &str,
    robot: &RobotConfig,
    config: &AppConfig,
    deps: &CatalogDeps,
    events: &Arc<EventBus>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn Robot>> {
    let Some(provider) = build_provider(robot, lookup) else {
        return Ok(Arc::new(ParrotRobot::new(name)));
    };

    let catalog = botrelay_tools::assemble(&robot.catalogs, &robot.tool_filter, deps)?;
    let tool_loop = ToolLoop::new(name, provider, Arc::new(catalog), robot.model_or_default())
        .with_system(robot.system_prompt.clone())
        .with_temperature(robot.temperature.unwrap_or(config.default_temperature))
        .with_max_tokens(robot.max_tokens.unwrap_or(config.default_max_tokens))
        .with_max_rounds(config.max_tool_rounds)
        .with_events(Arc::clone(events));

    let mut llm = LlmRobot::new(name, tool_loop)
        .with_follow_up_delay(Duration::from_millis(config.multipart.stagger_ms))
        .with_events(Arc::clone(events));
    if let Some(prompt) = &robot.follow_up_prompt {
        llm = llm.with_follow_up_prompt(prompt.clone());
    }
    Ok(Arc::new(llm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrelay_tools::{InMemoryFormRepository, SlackClient};

    fn deps() -> CatalogDeps {
        CatalogDeps {
            forms: Arc::new(InMemoryFormRepository::with_samples()),
            slack: Arc::new(SlackClient::new(None)),
        }
    }

    fn registry(lookup: impl Fn(&str) -> Option<String>) -> RobotRegistry {
        RobotRegistry::from_config(
            &AppConfig::default(),
            &deps(),
            Arc::new(EventBus::default()),
            lookup,
        )
        .unwrap()
    }

    #[test]
    fn default_config_registers_three_robots() {
        let registry = registry(|_| None);
        assert_eq!(registry.names(), vec!["forms", "parrot", "slack"]);
        assert_eq!(registry.get("slack").unwrap().provider_name(), Some("anthropic"));
        assert_eq!(registry.get("forms").unwrap().provider_name(), Some("openai"));
        assert_eq!(registry.get("parrot").unwrap().provider_name(), None);
    }

    #[test]
    fn credentials_are_detectable_up_front() {
        let without = registry(|_| None);
        assert!(!without.get("slack").unwrap().has_credential());
        assert!(without.get("parrot").unwrap().has_credential());

        let with = registry(|key| (key == "ANTHROPIC_API_KEY").then(|| "sk-ant-test".into()));
        assert!(with.get("slack").unwrap().has_credential());
        assert!(!with.get("forms").unwrap().has_credential());
    }

    #[test]
    fn follow_up_delay_comes_from_config() {
        let mut config = AppConfig::default();
        config.multipart.stagger_ms = 20;
        let registry =
            RobotRegistry::from_config(&config, &deps(), Arc::new(EventBus::default()), |_| None)
                .unwrap();
        assert_eq!(
            registry.get("slack").unwrap().follow_up_delay(),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn unknown_catalog_fails_construction() {
        let mut config = AppConfig::default();
        if let Some(slack) = config.robots.get_mut("slack") {
            slack.catalogs.push("teleport".into());
        }
        let result =
            RobotRegistry::from_config(&config, &deps(), Arc::new(EventBus::default()), |_| None);
        assert!(result.is_err());
    }

    #[test]
    fn register_replaces_by_name() {
        let registry = RobotRegistry::new()
            .with(Arc::new(ParrotRobot::new("echo")))
            .with(Arc::new(ParrotRobot::new("echo")));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
    }
}
