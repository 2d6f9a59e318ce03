//! # Colloquy Core
//!
//! Domain types, traits, and error definitions for the Colloquy session
//! driver. This crate knows nothing about HTTP or terminals; it defines the
//! conversation model that the other crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: messages and the [`ConversationContext`] they live in
//! - [`tool`]: the [`Tool`] capability and the ordered [`ToolRegistry`]
//! - [`backend`]: the [`Backend`] trait a text-generation service implements
//! - [`event`]: domain events published on an explicitly passed [`EventBus`]

pub mod backend;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{
    Backend, Fragment, FragmentReceiver, GenerationOptions, GenerationRequest,
    GenerationResponse, Usage,
};
pub use error::{BackendError, ContextError, Error, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationContext, ConversationId, Message, Role, ToolCallRequest};
pub use tool::{FnTool, Tool, ToolDescriptor, ToolRegistry, ToolResult};
