//! Conversation store implementations for botrelay.
//!
//! The production store is an external service; this crate provides the
//! in-memory store used by the CLI and by tests.

pub mod in_memory;

pub use in_memory::InMemoryConversationStore;
