//! LLM provider implementations for botrelay.
//!
//! All providers implement the `botrelay_core::Provider` trait.
//! [`build_provider`] picks the implementation a robot's configuration
//! asks for.

pub mod anthropic;
pub mod factory;
mod http;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use factory::{build_provider, default_base_url};
pub use openai_compat::OpenAiCompatProvider;
