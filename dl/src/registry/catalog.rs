//! Generic spec-file catalog
//!
//! A catalog is a directory of JSON spec files plus a manifest listing the
//! registered names. Entries validate on load and on register; an invalid
//! file is skipped with a warning rather than poisoning the whole catalog.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already registered: {0}")]
    Conflict(String),

    #[error("Validation failed for {name}: {detail}")]
    Invalid { name: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An entry a catalog can persist
pub trait CatalogEntry: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Entry-specific validation, run on load and on register
    fn validate(&self) -> Result<(), String>;
}

/// Aggregate view over a catalog
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub entries: usize,
    pub invalid_skipped: usize,
}

/// Directory-of-spec-files catalog with an in-memory index
pub struct Catalog<T: CatalogEntry> {
    dir: PathBuf,
    manifest_path: PathBuf,
    entries: RwLock<HashMap<String, T>>,
    invalid_skipped: usize,
}

impl<T: CatalogEntry> Catalog<T> {
    /// Open a catalog, loading and validating every listed entry
    pub fn open(dir: impl AsRef<Path>, manifest_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = manifest_path.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let names: Vec<String> = if manifest_path.exists() {
            serde_json::from_str(&fs::read_to_string(&manifest_path)?)?
        } else {
            Vec::new()
        };

        let mut entries = HashMap::new();
        let mut invalid_skipped = 0;
        for name in names {
            let path = dir.join(format!("{}.json", name));
            match fs::read_to_string(&path) {
                Ok(body) => match serde_json::from_str::<T>(&body) {
                    Ok(entry) => match entry.validate() {
                        Ok(()) => {
                            entries.insert(entry.name().to_string(), entry);
                        }
                        Err(detail) => {
                            warn!(%name, %detail, "Skipping invalid catalog entry");
                            invalid_skipped += 1;
                        }
                    },
                    Err(err) => {
                        warn!(%name, error = %err, "Skipping unparseable catalog entry");
                        invalid_skipped += 1;
                    }
                },
                Err(err) => {
                    warn!(%name, error = %err, "Skipping unreadable catalog entry");
                    invalid_skipped += 1;
                }
            }
        }

        debug!(dir = %dir.display(), count = entries.len(), "Opened catalog");
        Ok(Self {
            dir,
            manifest_path,
            entries: RwLock::new(entries),
            invalid_skipped,
        })
    }

    /// Register a new entry, persisting its spec file and the manifest
    pub fn register(&self, entry: T) -> Result<(), CatalogError> {
        entry.validate().map_err(|detail| CatalogError::Invalid {
            name: entry.name().to_string(),
            detail,
        })?;

        let name = entry.name().to_string();
        {
            let entries = self.entries.read().unwrap();
            if entries.contains_key(&name) {
                return Err(CatalogError::Conflict(name));
            }
        }

        self.write_entry(&entry)?;
        self.entries.write().unwrap().insert(name, entry);
        self.write_manifest()?;
        Ok(())
    }

    /// Replace an existing entry
    pub fn update(&self, entry: T) -> Result<(), CatalogError> {
        entry.validate().map_err(|detail| CatalogError::Invalid {
            name: entry.name().to_string(),
            detail,
        })?;

        let name = entry.name().to_string();
        if !self.entries.read().unwrap().contains_key(&name) {
            return Err(CatalogError::NotFound(name));
        }

        self.write_entry(&entry)?;
        self.entries.write().unwrap().insert(name, entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().unwrap().contains_key(name)
    }

    /// All entries, sorted by name
    pub fn list(&self) -> Vec<T> {
        let entries = self.entries.read().unwrap();
        let mut out: Vec<T> = entries.values().cloned().collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Case-insensitive substring search over names and descriptions
    pub fn search(&self, query: &str) -> Vec<T> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|e| {
                e.name().to_lowercase().contains(&query) || e.description().to_lowercase().contains(&query)
            })
            .collect()
    }

    pub fn delete(&self, name: &str) -> Result<(), CatalogError> {
        let removed = self.entries.write().unwrap().remove(name);
        if removed.is_none() {
            return Err(CatalogError::NotFound(name.to_string()));
        }

        let path = self.dir.join(format!("{}.json", name));
        if path.exists() {
            fs::remove_file(path)?;
        }
        self.write_manifest()?;
        Ok(())
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            entries: self.entries.read().unwrap().len(),
            invalid_skipped: self.invalid_skipped,
        }
    }

    fn write_entry(&self, entry: &T) -> Result<(), CatalogError> {
        let path = self.dir.join(format!("{}.json", entry.name()));
        fs::write(&path, serde_json::to_string_pretty(entry)?)?;
        Ok(())
    }

    fn write_manifest(&self) -> Result<(), CatalogError> {
        let names = self.names();
        fs::write(&self.manifest_path, serde_json::to_string_pretty(&names)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestEntry {
        name: String,
        description: String,
        valid: bool,
    }

    impl CatalogEntry for TestEntry {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            &self.description
        }

        fn validate(&self) -> Result<(), String> {
            if self.valid { Ok(()) } else { Err("marked invalid".to_string()) }
        }
    }

    fn entry(name: &str, description: &str) -> TestEntry {
        TestEntry {
            name: name.to_string(),
            description: description.to_string(),
            valid: true,
        }
    }

    fn open(dir: &Path) -> Catalog<TestEntry> {
        Catalog::open(dir.join("specs"), dir.join("manifest.json")).unwrap()
    }

    #[test]
    fn test_register_get_list() {
        let temp = tempdir().unwrap();
        let catalog = open(temp.path());

        catalog.register(entry("beta", "second")).unwrap();
        catalog.register(entry("alpha", "first")).unwrap();

        assert!(catalog.contains("alpha"));
        assert_eq!(catalog.get("beta").unwrap().description, "second");
        assert_eq!(catalog.names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_register_conflict() {
        let temp = tempdir().unwrap();
        let catalog = open(temp.path());

        catalog.register(entry("x", "")).unwrap();
        assert!(matches!(catalog.register(entry("x", "")), Err(CatalogError::Conflict(_))));
    }

    #[test]
    fn test_register_rejects_invalid() {
        let temp = tempdir().unwrap();
        let catalog = open(temp.path());

        let mut bad = entry("bad", "");
        bad.valid = false;
        assert!(matches!(catalog.register(bad), Err(CatalogError::Invalid { .. })));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp = tempdir().unwrap();
        {
            let catalog = open(temp.path());
            catalog.register(entry("persisted", "keeps")).unwrap();
        }
        let catalog = open(temp.path());
        assert!(catalog.contains("persisted"));
    }

    #[test]
    fn test_invalid_entry_skipped_on_load() {
        let temp = tempdir().unwrap();
        {
            let catalog = open(temp.path());
            catalog.register(entry("good", "")).unwrap();
            catalog.register(entry("turns-bad", "")).unwrap();
        }

        // Corrupt one spec file on disk
        let bad_path = temp.path().join("specs").join("turns-bad.json");
        fs::write(&bad_path, "{ nope").unwrap();

        let catalog = open(temp.path());
        assert!(catalog.contains("good"));
        assert!(!catalog.contains("turns-bad"));
        assert_eq!(catalog.stats().invalid_skipped, 1);
    }

    #[test]
    fn test_search() {
        let temp = tempdir().unwrap();
        let catalog = open(temp.path());
        catalog.register(entry("analyze_usage", "find symbol uses")).unwrap();
        catalog.register(entry("fmt", "format code")).unwrap();

        assert_eq!(catalog.search("symbol").len(), 1);
        assert_eq!(catalog.search("ANALYZE").len(), 1);
        assert!(catalog.search("missing").is_empty());
    }

    #[test]
    fn test_delete() {
        let temp = tempdir().unwrap();
        let catalog = open(temp.path());
        catalog.register(entry("doomed", "")).unwrap();
        catalog.delete("doomed").unwrap();

        assert!(!catalog.contains("doomed"));
        assert!(matches!(catalog.delete("doomed"), Err(CatalogError::NotFound(_))));
    }
}
