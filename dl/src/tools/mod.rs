//! Tool system
//!
//! Built-in tools run in-process; dynamic tools run in isolated
//! subprocesses. The handler is the single validated entry point for
//! model-requested calls.

pub mod builtin;
mod context;
mod creator;
mod error;
mod handler;
mod subprocess;
mod traits;
mod validator;

pub use context::ToolContext;
pub use creator::{DEFAULT_PROPOSAL_THRESHOLD, ToolCreator, ToolProposal};
pub use error::ToolError;
pub use handler::ToolHandler;
pub use subprocess::{DEFAULT_TOOL_TIMEOUT, DynamicToolRunner};
pub use traits::{Tool, ToolOutcome, ToolResult};
pub use validator::{ToolMetrics, ToolValidator};
