//! Provider construction from robot configuration.
//!
//! Credentials are resolved here, once. A missing key does not stop
//! construction: the provider reports it on the first call instead.

use std::sync::Arc;

use botrelay_config::RobotConfig;
use botrelay_core::provider::Provider;
use tracing::warn;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider a robot talks to.
///
/// Returns `None` for robots that need no provider (the parrot).
pub fn build_provider(
    robot: &RobotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<Arc<dyn Provider>> {
    if robot.is_parrot() {
        return None;
    }

    let api_key = robot.resolve_api_key(&lookup);
    let key_env = robot.credential_env().unwrap_or_default();
    if api_key.is_none() && robot.provider != "ollama" {
        warn!(provider = %robot.provider, env_var = %key_env, "Provider credential not set");
    }

    let provider: Arc<dyn Provider> = match robot.provider.as_str() {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key).with_key_env(key_env);
            if let Some(url) = &robot.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(robot.api_url.as_deref())),
        name => {
            let base_url = robot
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, base_url, api_key).with_key_env(key_env))
        }
    };
    Some(provider)
}

/// Default base URL for well-known OpenAI-compatible providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrelay_config::AppConfig;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parrot_has_no_provider() {
        let config = AppConfig::default();
        assert!(build_provider(&config.robots["parrot"], no_env).is_none());
    }

    #[test]
    fn anthropic_robot_without_key_still_builds() {
        let config = AppConfig::default();
        let provider = build_provider(&config.robots["slack"], no_env).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert!(!provider.has_credential());
    }

    #[test]
    fn openai_robot_reads_key_from_lookup() {
        let config = AppConfig::default();
        let provider = build_provider(&config.robots["forms"], |k| {
            (k == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .unwrap();
        assert_eq!(provider.name(), "openai");
        assert!(provider.has_credential());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("groq").contains("groq.com"));
        assert!(default_base_url("openai").contains("api.openai.com"));
    }
}
