//! Document-based IPC
//!
//! Markdown files act as phase-to-phase mailboxes plus a set of shared
//! strategic documents owned by planning.

mod documents;

pub use documents::{DocumentHub, PhaseDocuments, SharedDoc};
