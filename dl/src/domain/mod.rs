//! Domain types for the development pipeline
//!
//! Tasks, objectives, file records, phase records, patterns and
//! correlations - the entities the coordinator schedules around and the
//! state store persists.

mod correlation;
mod dimensions;
mod file;
mod id;
mod objective;
mod pattern;
mod phase;
mod priority;
mod task;

pub use correlation::{Correlation, CorrelationKind, Finding, FindingComponent};
pub use dimensions::{DIMENSION_COUNT, Dimension, DimensionalProfile};
pub use file::{FileRecord, FileStatus, hash_content};
pub use id::generate_id;
pub use objective::{Objective, ObjectiveTier};
pub use pattern::{Pattern, PatternKind};
pub use phase::{PhaseKind, PhaseRecord, RunRecord};
pub use priority::Priority;
pub use task::{Issue, IssueKind, IssueSeverity, Task, TaskStatus};
