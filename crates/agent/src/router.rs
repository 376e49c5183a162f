//! Content-based robot selection.
//!
//! An ordered rule table. The first rule whose matcher accepts the message
//! text decides the robot and the response mode; when none does, the
//! fallback robot answers in immediate mode. Routing reads only the
//! message content, so the same text always routes the same way.

use std::sync::Arc;

use botrelay_config::RoutingConfig;
use botrelay_core::error::RoutingError;
use botrelay_core::message::ConversationMessage;
use botrelay_core::robot::{ResponseMode, Robot};
use regex_lite::Regex;
use tracing::debug;

use crate::registry::RobotRegistry;

/// A Slack user or workspace mention, e.g. `<@U123>` or `<@W0AB|ada>`.
const SLACK_MENTION: &str = r"<@[UW][A-Z0-9]+(?:\|[^>]*)?>";

/// `form`, `formId`, `form_id` or `form id`, then an id-like token
/// containing at least one digit.
const FORM_REFERENCE: &str =
    r"(?i)\bform(?:[ _-]?id)?\b\s*[:=#]?\s*(?:[A-Za-z0-9][A-Za-z0-9_-]*)?\d[A-Za-z0-9_-]*";

pub const FALLBACK_RULE: &str = "fallback";

/// What a rule looks for in the message text.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// A Slack mention token, or any brand keyword (case-insensitive).
    SlackContext { mention: Regex, keywords: Vec<String> },
    /// A form id reference.
    FormReference(Regex),
}

impl Matcher {
    pub fn slack_context<S: AsRef<str>>(keywords: &[S]) -> Result<Self, RoutingError> {
        Ok(Self::SlackContext {
            mention: compile(SLACK_MENTION)?,
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    pub fn form_reference() -> Result<Self, RoutingError> {
        Ok(Self::FormReference(compile(FORM_REFERENCE)?))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::SlackContext { mention, keywords } => {
                if mention.is_match(text) {
                    return true;
                }
                let lower = text.to_lowercase();
                keywords.iter().any(|k| lower.contains(k.as_str()))
            }
            Self::FormReference(pattern) => pattern.is_match(text),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, RoutingError> {
    Regex::new(pattern).map_err(|e| RoutingError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// One row of the table: pattern → {robot, mode}.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub name: String,
    pub matcher: Matcher,
    pub robot: String,
    pub mode: ResponseMode,
}

impl RoutingRule {
    pub fn new(
        name: impl Into<String>,
        matcher: Matcher,
        robot: impl Into<String>,
        mode: ResponseMode,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            robot: robot.into(),
            mode,
        }
    }
}

/// The router's answer for one message. Never stored.
#[derive(Clone)]
pub struct RoutingDecision {
    pub robot: Arc<dyn Robot>,
    pub mode: ResponseMode,
    /// Name of the rule that fired
    pub rule: String,
}

impl RoutingDecision {
    pub fn robot_name(&self) -> &str {
        self.robot.name()
    }
}

impl std::fmt::Debug for RoutingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingDecision")
            .field("robot", &self.robot.name())
            .field("mode", &self.mode)
            .field("rule", &self.rule)
            .finish()
    }
}

pub struct Router {
    rules: Vec<RoutingRule>,
    /// `rules[i]` routes to `targets[i]`
    targets: Vec<Arc<dyn Robot>>,
    fallback: Arc<dyn Robot>,
    registry: RobotRegistry,
}

impl Router {
    /// Build a router. Every rule target and the fallback must be registered.
    pub fn new(
        rules: Vec<RoutingRule>,
        fallback: &str,
        registry: RobotRegistry,
    ) -> Result<Self, RoutingError> {
        let resolve = |name: &str| {
            registry
                .get(name)
                .ok_or_else(|| RoutingError::UnknownRobot(name.to_string()))
        };
        let targets = rules
            .iter()
            .map(|r| resolve(r.robot.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = resolve(fallback)?;
        Ok(Self {
            rules,
            targets,
            fallback,
            registry,
        })
    }

    /// The standard table: Slack context, then form references, then fallback.
    pub fn from_config(
        routing: &RoutingConfig,
        registry: RobotRegistry,
    ) -> Result<Self, RoutingError> {
        let rules = vec![
            RoutingRule::new(
                "slack_context",
                Matcher::slack_context(&routing.slack_keywords)?,
                &routing.slack_robot,
                ResponseMode::MultiPart,
            ),
            RoutingRule::new(
                "form_reference",
                Matcher::form_reference()?,
                &routing.form_robot,
                ResponseMode::MultiPart,
            ),
        ];
        Self::new(rules, &routing.default_robot, registry)
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn registry(&self) -> &RobotRegistry {
        &self.registry
    }

    pub fn fallback(&self) -> &str {
        self.fallback.name()
    }

    /// Pick a robot and mode for `message`. Non-text content falls through.
    pub fn route(&self, message: &ConversationMessage) -> RoutingDecision {
        let text = message.text().unwrap_or_default();
        let decision = self
            .rules
            .iter()
            .zip(&self.targets)
            .find(|(rule, _)| rule.matcher.matches(text))
            .map(|(rule, robot)| RoutingDecision {
                robot: Arc::clone(robot),
                mode: rule.mode,
                rule: rule.name.clone(),
            })
            .unwrap_or_else(|| RoutingDecision {
                robot: Arc::clone(&self.fallback),
                mode: ResponseMode::Immediate,
                rule: FALLBACK_RULE.into(),
            });

        debug!(
            message_id = %message.id,
            rule = %decision.rule,
            robot = %decision.robot_name(),
            mode = %decision.mode,
            "Routed message"
        );
        decision
    }

    /// Bypass the rules and address a robot by name.
    pub fn direct(&self, robot: &str, mode: ResponseMode) -> Result<RoutingDecision, RoutingError> {
        let robot = self
            .registry
            .get(robot)
            .ok_or_else(|| RoutingError::UnknownRobot(robot.to_string()))?;
        Ok(RoutingDecision {
            robot,
            mode,
            rule: "direct".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parrot::ParrotRobot;
    use botrelay_core::message::{ConversationId, MessageContent, Participant};

    fn registry() -> RobotRegistry {
        RobotRegistry::new()
            .with(Arc::new(ParrotRobot::new("slack")))
            .with(Arc::new(ParrotRobot::new("forms")))
            .with(Arc::new(ParrotRobot::new("parrot")))
    }

    fn router() -> Router {
        Router::from_config(&RoutingConfig::default(), registry()).unwrap()
    }

    fn route(text: &str) -> (String, ResponseMode) {
        let msg = ConversationMessage::customer(ConversationId::from("c"), text);
        let decision = router().route(&msg);
        (decision.robot_name().to_string(), decision.mode)
    }

    #[test]
    fn slack_mention_beats_form_reference() {
        assert_eq!(
            route("<@U123> help with formId: F-1001"),
            ("slack".into(), ResponseMode::MultiPart)
        );
    }

    #[test]
    fn slack_keyword_is_case_insensitive() {
        assert_eq!(
            route("Can you post this on SLACK?"),
            ("slack".into(), ResponseMode::MultiPart)
        );
    }

    #[test]
    fn form_references_route_to_forms() {
        for text in [
            "What is formId F-1001 about?",
            "form_id=F-2040",
            "please open form 42",
            "form 7",
            "FORM ID: abc123",
        ] {
            assert_eq!(
                route(text),
                ("forms".into(), ResponseMode::MultiPart),
                "{text}"
            );
        }
    }

    #[test]
    fn form_without_an_id_falls_back() {
        for text in ["fill in the form please", "formal greetings", "forms are fun"] {
            assert_eq!(
                route(text),
                ("parrot".into(), ResponseMode::Immediate),
                "{text}"
            );
        }
    }

    #[test]
    fn plain_text_falls_back_to_parrot() {
        assert_eq!(route("hello"), ("parrot".into(), ResponseMode::Immediate));
    }

    #[test]
    fn routing_is_pure() {
        let router = router();
        let msg = ConversationMessage::customer(ConversationId::from("c"), "<@W42> hi");
        let a = router.route(&msg);
        let b = router.route(&msg);
        assert_eq!(a.robot_name(), b.robot_name());
        assert_eq!(a.mode, b.mode);
        assert_eq!(a.rule, "slack_context");
    }

    #[test]
    fn non_text_content_falls_back() {
        let msg = ConversationMessage::new(
            ConversationId::from("c"),
            Participant::Customer,
            Participant::Robot,
            MessageContent::Json(serde_json::json!({"text": "slack"})),
        );
        let decision = router().route(&msg);
        assert_eq!(decision.rule, FALLBACK_RULE);
    }

    #[test]
    fn unregistered_targets_are_rejected() {
        let routing = RoutingConfig {
            form_robot: "missing".into(),
            ..RoutingConfig::default()
        };
        let err = Router::from_config(&routing, registry()).err().unwrap();
        assert!(matches!(err, RoutingError::UnknownRobot(name) if name == "missing"));
    }

    #[test]
    fn direct_addresses_any_registered_robot() {
        let router = router();
        let decision = router.direct("forms", ResponseMode::Streaming).unwrap();
        assert_eq!(decision.robot_name(), "forms");
        assert_eq!(decision.rule, "direct");
        assert!(router.direct("nobody", ResponseMode::Immediate).is_err());
    }
}
