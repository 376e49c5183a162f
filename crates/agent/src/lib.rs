//! Robot orchestration for botrelay.
//!
//! An inbound message flows through:
//!
//! 1. **Route**: the [`Router`] matches the text against an ordered rule
//!    table and picks a robot and a response mode
//! 2. **Adapt history**: stored messages become provider turns, minus
//!    internal tool chatter
//! 3. **Tool-call loop**: the provider is called, requested tools run
//!    through the robot's catalog, and the results go back until the
//!    provider stops asking
//! 4. **Deliver**: as one value, a stream of callbacks, or an immediate
//!    reply plus delayed parts
//!
//! The loop is capped by `max_rounds` so a provider that keeps asking for
//! tools cannot spin forever.

pub mod history;
pub mod llm_robot;
pub mod loop_runner;
pub mod orchestrator;
pub mod parrot;
pub mod registry;
pub mod router;

#[cfg(test)]
mod test_helpers;

pub use llm_robot::LlmRobot;
pub use loop_runner::{Delivery, LoopOutcome, ToolLoop};
pub use orchestrator::{Dispatched, MessageOrchestrator};
pub use parrot::ParrotRobot;
pub use registry::RobotRegistry;
pub use router::{Matcher, Router, RoutingDecision, RoutingRule};
