//! # botrelay core
//!
//! Domain types, traits, and error definitions for the botrelay robot
//! orchestration runtime. This crate has **no framework dependencies**: it
//! defines the model every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: stored conversation messages and request/response envelopes
//! - [`provider`]: the provider-agnostic turn format and the `Provider` trait
//! - [`tool`]: tool declarations, the `ToolCatalog` contract and `ToolSet`
//! - [`robot`]: the three-mode `Robot` contract and its callback types
//! - [`store`]: the external conversation store seam
//! - [`stream_event`]: streaming callbacks as a channel of events
//! - [`event`]: broadcast domain events

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod robot;
pub mod store;
pub mod stream_event;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RoutingError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{
    ConversationId, ConversationMessage, EnvelopeKind, MessageContent, MessageEnvelope,
    MessageType, NewMessage, Participant,
};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, StopReason, StreamChunk, ToolDefinition, Turn,
    TurnRole, TurnToolCall, Usage,
};
pub use robot::{DelayedCallback, HistorySource, ResponseMode, Robot, StreamCallbacks};
pub use store::{ConversationStore, StoreHistory};
pub use stream_event::RobotStreamEvent;
pub use tool::{Tool, ToolCatalog, ToolSet};
