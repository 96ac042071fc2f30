//! Model transport layer
//!
//! The core consumes opaque model endpoints through [`SpecialistClient`];
//! the HTTP implementation and the scripted mock both live here.

mod client;
mod error;
mod http;
mod parse;
mod specialists;
mod types;

pub use client::SpecialistClient;
pub use client::mock;
pub use error::LlmError;
pub use http::{EndpointConfig, HttpSpecialistClient};
pub use parse::{StreamAssembler, extract_tool_calls};
pub use specialists::{SpecialistKind, Specialists};
pub use types::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Role, StopReason, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition,
};
