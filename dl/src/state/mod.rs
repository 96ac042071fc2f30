//! Pipeline state: snapshot type, invariants and atomic persistence

mod snapshot;
mod store;

pub use snapshot::{PipelineState, RECENT_MESSAGE_CAP};
pub use store::{PIPELINE_DIR, StateError, StateStore};
