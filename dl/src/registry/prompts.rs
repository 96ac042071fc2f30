//! Prompt template registry
//!
//! Templates are Handlebars sources. Lookup order: registered entry, then
//! embedded fallback, so a fresh project can run before any phase has
//! designed a custom prompt.

use std::path::Path;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};

use super::catalog::{Catalog, CatalogEntry, CatalogError, CatalogStats};

/// Embedded fallback templates keyed by name
const EMBEDDED: &[(&str, &str)] = &[
    (
        "planning",
        "You are the planning phase of an autonomous development pipeline.\n\
         Master plan:\n{{master_plan}}\n\nCurrent tasks:\n{{task_summary}}\n\n\
         Break the remaining work into small, file-scoped tasks. For each task\n\
         respond with a create_task tool call.",
    ),
    (
        "coding",
        "You are the coding phase. Task: {{task_title}}\n\n{{task_description}}\n\n\
         Target files: {{target_files}}\n\nRead the relevant files, then apply\n\
         the edits with tool calls. Do not approve your own work.",
    ),
    (
        "qa",
        "You are the QA phase. Review these files against the quality criteria:\n\
         {{target_files}}\n\nFor every defect found, report it with an exact\n\
         file, a kind and a severity.",
    ),
    (
        "debugging",
        "You are the debugging phase. A defect needs fixing:\n{{issue_description}}\n\n\
         Target files: {{target_files}}\n\nRead the files, find the fault, apply\n\
         a minimal fix.",
    ),
    (
        "meta_reasoning",
        "The pipeline is not making progress.\n\nRecent history:\n{{history}}\n\n\
         Recommend the single next phase (one of: {{phases}}) and say why in one\n\
         sentence. Respond as `phase: <name>`.",
    ),
];

/// A registered prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,

    /// Handlebars source
    pub template: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogEntry for PromptTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("prompt name is empty".to_string());
        }
        if self.template.trim().is_empty() {
            return Err("prompt template is empty".to_string());
        }
        // Catch malformed handlebars early rather than at render time
        Handlebars::new()
            .render_template(&self.template, &serde_json::json!({}))
            .map_err(|e| format!("template does not render: {}", e))?;
        Ok(())
    }
}

/// Catalog of prompt templates with embedded fallbacks
pub struct PromptRegistry {
    catalog: Catalog<PromptTemplate>,
    hbs: Handlebars<'static>,
}

impl PromptRegistry {
    pub fn open(dir: impl AsRef<Path>, manifest: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Ok(Self {
            catalog: Catalog::open(dir, manifest)?,
            hbs: Handlebars::new(),
        })
    }

    pub fn register(&self, template: PromptTemplate) -> Result<(), CatalogError> {
        self.catalog.register(template)
    }

    pub fn update(&self, template: PromptTemplate) -> Result<(), CatalogError> {
        self.catalog.update(template)
    }

    pub fn get(&self, name: &str) -> Option<PromptTemplate> {
        self.catalog.get(name).or_else(|| {
            EMBEDDED.iter().find(|(n, _)| *n == name).map(|(n, t)| PromptTemplate {
                name: n.to_string(),
                description: "embedded default".to_string(),
                template: t.to_string(),
                tags: vec!["embedded".to_string()],
            })
        })
    }

    pub fn list(&self) -> Vec<PromptTemplate> {
        self.catalog.list()
    }

    pub fn search(&self, query: &str) -> Vec<PromptTemplate> {
        self.catalog.search(query)
    }

    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        self.catalog.delete(name)
    }

    pub fn stats(&self) -> CatalogStats {
        self.catalog.stats()
    }

    /// Render a template with the given context
    pub fn render<C: Serialize>(&self, name: &str, context: &C) -> Result<String> {
        let template = self.get(name).ok_or_else(|| eyre!("Prompt template not found: {}", name))?;
        self.hbs
            .render_template(&template.template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", name, e))
    }
}
