//! Dynamic tool registry
//!
//! Dynamic tools are standalone script files under `scripts/custom_tools/`
//! executed in a subprocess by the tool executor. The registry holds their
//! specs and verifies the safety predicate on every new entry.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::catalog::{Catalog, CatalogEntry, CatalogError, CatalogStats};

/// Directory (relative to the project root) where tool scripts live
pub const CUSTOM_TOOLS_DIR: &str = "scripts/custom_tools";

/// Interpreters a dynamic tool may request
const ALLOWED_INTERPRETERS: &[&str] = &["python3", "python", "sh", "bash", "node"];

/// Characters that would let a spec smuggle shell execution
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '(', ')', '\n'];

/// Spec for one dynamic tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicToolSpec {
    pub name: String,
    pub description: String,

    /// Script file name inside [`CUSTOM_TOOLS_DIR`]
    pub entry: String,

    pub interpreter: String,

    /// Wall-clock timeout override in seconds
    pub timeout_secs: Option<u64>,

    /// Declared parameter names, for the model-facing schema
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl DynamicToolSpec {
    /// Absolute path of the tool script under the given project root
    pub fn script_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(CUSTOM_TOOLS_DIR).join(&self.entry)
    }
}

impl CatalogEntry for DynamicToolSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Safety predicate: no shell metacharacters anywhere, an allowlisted
    /// interpreter, and an entry path that cannot escape the tools dir.
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("tool name is empty".to_string());
        }
        for field in [&self.name, &self.entry, &self.interpreter] {
            if field.chars().any(|c| SHELL_METACHARACTERS.contains(&c) || c.is_whitespace()) {
                return Err(format!("'{}' contains forbidden characters", field));
            }
        }
        if !ALLOWED_INTERPRETERS.contains(&self.interpreter.as_str()) {
            return Err(format!(
                "interpreter '{}' is not allowed (one of: {})",
                self.interpreter,
                ALLOWED_INTERPRETERS.join(", ")
            ));
        }

        let entry = Path::new(&self.entry);
        if entry.is_absolute() || entry.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("entry '{}' escapes {}", self.entry, CUSTOM_TOOLS_DIR));
        }

        Ok(())
    }
}

/// Catalog of dynamic tool specs (manifest: `.pipeline/tool_specs.json`)
pub struct ToolRegistry {
    catalog: Catalog<DynamicToolSpec>,
}

impl ToolRegistry {
    pub fn open(dir: impl AsRef<Path>, manifest: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Ok(Self {
            catalog: Catalog::open(dir, manifest)?,
        })
    }

    pub fn register(&self, spec: DynamicToolSpec) -> Result<(), CatalogError> {
        self.catalog.register(spec)
    }

    pub fn update(&self, spec: DynamicToolSpec) -> Result<(), CatalogError> {
        self.catalog.update(spec)
    }

    pub fn get(&self, name: &str) -> Option<DynamicToolSpec> {
        self.catalog.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.contains(name)
    }

    pub fn list(&self) -> Vec<DynamicToolSpec> {
        self.catalog.list()
    }

    pub fn names(&self) -> Vec<String> {
        self.catalog.names()
    }

    pub fn search(&self, query: &str) -> Vec<DynamicToolSpec> {
        self.catalog.search(query)
    }

    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        self.catalog.delete(name)
    }

    pub fn stats(&self) -> CatalogStats {
        self.catalog.stats()
    }
}
