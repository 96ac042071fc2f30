//! devloop - autonomous development pipeline orchestrator
//!
//! devloop repeatedly inspects a target source tree, decides which
//! specialized phase should run next (planning, coding, QA, debugging,
//! refactoring, documentation, self-improvement), dispatches the phase
//! against configured model specialists, applies the resulting file edits,
//! and loops until its objectives are met or a stop condition trips.
//!
//! # Core pieces
//!
//! - [`coordinator`] - the outer decide/execute/absorb/persist loop
//! - [`phases`] - the uniform phase contract and every concrete phase
//! - [`bus`] - in-process pub/sub with priorities and request/response
//! - [`ipc`] - markdown mailboxes and shared strategic documents
//! - [`state`] - atomically persisted pipeline state
//! - [`tools`] - validated tool dispatch plus subprocess isolation
//! - [`registry`] - prompt/tool/role catalogs
//! - [`patterns`] - execution pattern mining and the optimizer
//! - [`scheduler`] - dimensional phase scoring
//! - [`llm`] - the specialist client trait, transport and mock

pub mod bus;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod correlation;
pub mod domain;
pub mod ipc;
pub mod llm;
pub mod patterns;
pub mod phases;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod tools;

// Re-export commonly used types
pub use bus::{Message, MessageBus, MessageType};
pub use config::{Config, EndpointSettings, SpecialistsConfig};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle, StopReason, spawn_observer};
pub use domain::{
    Correlation, Dimension, DimensionalProfile, FileRecord, FileStatus, Issue, IssueKind, IssueSeverity, Objective,
    ObjectiveTier, Pattern, PatternKind, PhaseKind, PhaseRecord, Priority, Task, TaskStatus,
};
pub use llm::{ChatRequest, ChatResponse, LlmError, SpecialistClient, SpecialistKind, Specialists};
pub use phases::{Phase, PhaseContext, PhaseErrorKind, PhaseResult, PruneMode, PrunePolicy};
pub use scheduler::{DimensionalScheduler, SchedulerConfig};
pub use state::{PipelineState, StateError, StateStore};
pub use tools::{ToolContext, ToolCreator, ToolError, ToolHandler, ToolValidator};
