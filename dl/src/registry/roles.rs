//! Specialist role registry
//!
//! A role binds a named way of working (system prompt, temperature) to one
//! of the three specialist kinds. The role design/improvement phases
//! evolve these entries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::catalog::{Catalog, CatalogEntry, CatalogError, CatalogStats};
use crate::llm::SpecialistKind;

/// A registered specialist role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,

    /// Which specialist serves this role
    pub specialist: SpecialistKind,

    pub system_prompt: String,

    pub temperature: Option<f32>,
}

impl CatalogEntry for RoleSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("role name is empty".to_string());
        }
        if self.system_prompt.trim().is_empty() {
            return Err("role system prompt is empty".to_string());
        }
        if let Some(t) = self.temperature
            && !(0.0..=1.0).contains(&t)
        {
            return Err(format!("temperature {} outside [0, 1]", t));
        }
        Ok(())
    }
}

/// Catalog of specialist roles
pub struct RoleRegistry {
    catalog: Catalog<RoleSpec>,
}

impl RoleRegistry {
    pub fn open(dir: impl AsRef<Path>, manifest: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Ok(Self {
            catalog: Catalog::open(dir, manifest)?,
        })
    }

    pub fn register(&self, role: RoleSpec) -> Result<(), CatalogError> {
        self.catalog.register(role)
    }

    pub fn update(&self, role: RoleSpec) -> Result<(), CatalogError> {
        self.catalog.update(role)
    }

    pub fn get(&self, name: &str) -> Option<RoleSpec> {
        self.catalog.get(name)
    }

    pub fn list(&self) -> Vec<RoleSpec> {
        self.catalog.list()
    }

    pub fn search(&self, query: &str) -> Vec<RoleSpec> {
        self.catalog.search(query)
    }

    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        self.catalog.delete(name)
    }

    pub fn stats(&self) -> CatalogStats {
        self.catalog.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn role(name: &str) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            description: "reviewer".to_string(),
            specialist: SpecialistKind::Reasoning,
            system_prompt: "You review code carefully.".to_string(),
            temperature: Some(0.2),
        }
    }

    #[test]
    fn test_register_and_get() {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::open(temp.path().join("roles"), temp.path().join("roles.json")).unwrap();

        registry.register(role("strict-reviewer")).unwrap();
        let fetched = registry.get("strict-reviewer").unwrap();
        assert_eq!(fetched.specialist, SpecialistKind::Reasoning);
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::open(temp.path().join("roles"), temp.path().join("roles.json")).unwrap();

        let mut bad = role("hot");
        bad.temperature = Some(3.0);
        assert!(registry.register(bad).is_err());
    }

    #[test]
    fn test_rejects_empty_prompt() {
        let temp = tempdir().unwrap();
        let registry = RoleRegistry::open(temp.path().join("roles"), temp.path().join("roles.json")).unwrap();

        let mut bad = role("empty");
        bad.system_prompt = "  ".to_string();
        assert!(registry.register(bad).is_err());
    }
}
