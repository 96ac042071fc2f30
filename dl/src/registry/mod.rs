//! Dynamic, persisted catalogs of prompt templates, tool specs and
//! specialist roles
//!
//! All three registries share one catalog mechanism: a directory of JSON
//! spec files plus a manifest. They are constructed once by the
//! coordinator and injected; a phase never builds its own registry.

mod catalog;
mod prompts;
mod roles;
mod tools;

pub use catalog::{Catalog, CatalogEntry, CatalogError, CatalogStats};
pub use prompts::{PromptRegistry, PromptTemplate};
pub use roles::{RoleRegistry, RoleSpec};
pub use tools::{CUSTOM_TOOLS_DIR, DynamicToolSpec, ToolRegistry};
