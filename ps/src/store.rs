//! SQLite-backed record store with secondary indexes

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::{Filter, FilterOp, IndexValue, Record, StoreError};

/// Single-file record store
///
/// One `records` table holds serialized bodies keyed by (collection, id);
/// one `record_index` table holds the declared indexed fields. Writes keep
/// both in sync. An exclusive advisory lock on a sibling `.lock` file
/// prevents concurrent processes from opening the same store.
pub struct Store {
    conn: Connection,
    #[allow(dead_code)]
    lock_file: File,
    path: PathBuf,
}

impl Store {
    /// Open or create a store at the given database file path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS record_index (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                field      TEXT NOT NULL,
                value_text TEXT,
                value_num  REAL,
                PRIMARY KEY (collection, id, field)
            );
            CREATE INDEX IF NOT EXISTS idx_record_index_text
                ON record_index (collection, field, value_text);
            CREATE INDEX IF NOT EXISTS idx_record_index_num
                ON record_index (collection, field, value_num);",
        )?;

        debug!(path = %path.display(), "Opened record store");
        Ok(Self { conn, lock_file, path })
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new record, failing if the id already exists
    pub fn create<T: Record>(&mut self, record: T) -> Result<String, StoreError> {
        let collection = T::collection_name();
        let id = record.id().to_string();

        if self.exists(collection, &id)? {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id,
            });
        }

        let body = serde_json::to_string(&record)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![collection, id, body, record.updated_at()],
        )?;
        write_index_rows(&tx, collection, &id, &record.indexed_fields())?;
        tx.commit()?;

        debug!(collection, id = %id, "Created record");
        Ok(id)
    }

    /// Fetch a record by id
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let collection = T::collection_name();
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE collection = ?1 AND id = ?2")?;
        let mut rows = stmt.query(params![collection, id])?;

        match rows.next()? {
            Some(row) => {
                let body: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// Replace an existing record, failing if it does not exist
    pub fn update<T: Record>(&mut self, record: T) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let id = record.id().to_string();

        if !self.exists(collection, &id)? {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id,
            });
        }

        let body = serde_json::to_string(&record)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE records SET body = ?3, updated_at = ?4 WHERE collection = ?1 AND id = ?2",
            params![collection, id, body, record.updated_at()],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        write_index_rows(&tx, collection, &id, &record.indexed_fields())?;
        tx.commit()?;

        debug!(collection, id = %id, "Updated record");
        Ok(())
    }

    /// Delete a record by id
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<(), StoreError> {
        let collection = T::collection_name();
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        tx.commit()?;

        if deleted == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// List records matching all the given index filters
    ///
    /// With no filters, returns the whole collection.
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>, StoreError> {
        let collection = T::collection_name();

        let ids = if filters.is_empty() {
            None
        } else {
            let mut candidate: Option<Vec<String>> = None;
            for filter in filters {
                let matched = self.ids_matching(collection, filter)?;
                candidate = Some(match candidate {
                    None => matched,
                    Some(prev) => prev.into_iter().filter(|id| matched.contains(id)).collect(),
                });
            }
            candidate
        };

        let mut out = Vec::new();
        match ids {
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY updated_at")?;
                let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
                for body in rows {
                    out.push(serde_json::from_str(&body?)?);
                }
            }
            Some(ids) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT body FROM records WHERE collection = ?1 AND id = ?2")?;
                for id in ids {
                    let mut rows = stmt.query(params![collection, id])?;
                    if let Some(row) = rows.next()? {
                        let body: String = row.get(0)?;
                        out.push(serde_json::from_str(&body)?);
                    }
                }
            }
        }

        Ok(out)
    }

    /// Count records in a collection
    pub fn count<T: Record>(&self) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![T::collection_name()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Rebuild the secondary index for every record in a collection
    ///
    /// Returns the number of records reindexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize, StoreError> {
        let records: Vec<T> = self.list(&[])?;
        let collection = T::collection_name();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM record_index WHERE collection = ?1", params![collection])?;
        for record in &records {
            write_index_rows(&tx, collection, record.id(), &record.indexed_fields())?;
        }
        tx.commit()?;

        info!(collection, count = records.len(), "Rebuilt indexes");
        Ok(records.len())
    }

    /// Reclaim space after heavy deletion
    pub fn compact(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("VACUUM")?;
        debug!("Compacted store");
        Ok(())
    }

    fn exists(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    fn ids_matching(&self, collection: &str, filter: &Filter) -> Result<Vec<String>, StoreError> {
        let (clause, text, num) = match (&filter.value, filter.op) {
            (IndexValue::String(s), FilterOp::Eq) => ("value_text = ?3", Some(s.clone()), None),
            (IndexValue::String(s), FilterOp::Ne) => ("value_text != ?3", Some(s.clone()), None),
            (IndexValue::String(s), FilterOp::Gte) => ("value_text >= ?3", Some(s.clone()), None),
            (IndexValue::String(s), FilterOp::Lte) => ("value_text <= ?3", Some(s.clone()), None),
            (v, op) => {
                let n = v.as_num().unwrap_or(0.0);
                let clause = match op {
                    FilterOp::Eq => "value_num = ?3",
                    FilterOp::Ne => "value_num != ?3",
                    FilterOp::Gte => "value_num >= ?3",
                    FilterOp::Lte => "value_num <= ?3",
                };
                (clause, None, Some(n))
            }
        };

        let sql = format!(
            "SELECT id FROM record_index WHERE collection = ?1 AND field = ?2 AND {}",
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut ids = Vec::new();
        match (text, num) {
            (Some(t), _) => {
                let rows = stmt.query_map(params![collection, filter.field, t], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            (_, Some(n)) => {
                let rows = stmt.query_map(params![collection, filter.field, n], |row| row.get::<_, String>(0))?;
                for id in rows {
                    ids.push(id?);
                }
            }
            _ => unreachable!("filter value is either text or numeric"),
        }
        Ok(ids)
    }
}

fn write_index_rows(
    tx: &rusqlite::Transaction<'_>,
    collection: &str,
    id: &str,
    fields: &std::collections::HashMap<String, IndexValue>,
) -> Result<(), StoreError> {
    for (field, value) in fields {
        let (text, num) = match value {
            IndexValue::String(s) => (Some(s.clone()), None),
            IndexValue::Int(n) => (None, Some(*n as f64)),
            IndexValue::Float(f) => (None, Some(*f)),
        };
        tx.execute(
            "INSERT INTO record_index (collection, id, field, value_text, value_num)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![collection, id, field, text, num],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_ms;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample {
        id: String,
        kind: String,
        score: f64,
        updated_at: i64,
    }

    impl Sample {
        fn new(id: &str, kind: &str, score: f64) -> Self {
            Self {
                id: id.to_string(),
                kind: kind.to_string(),
                score,
                updated_at: now_ms(),
            }
        }
    }

    impl Record for Sample {
        fn id(&self) -> &str {
            &self.id
        }

        fn updated_at(&self) -> i64 {
            self.updated_at
        }

        fn collection_name() -> &'static str {
            "samples"
        }

        fn indexed_fields(&self) -> HashMap<String, IndexValue> {
            HashMap::from([
                ("kind".to_string(), IndexValue::String(self.kind.clone())),
                ("score".to_string(), IndexValue::Float(self.score)),
            ])
        }
    }

    fn open_store() -> (tempfile::TempDir, Store) {
        let temp = tempdir().unwrap();
        let store = Store::open(temp.path().join("test.db")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_create_and_get() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("s1", "success", 0.9)).unwrap();

        let fetched: Sample = store.get("s1").unwrap().unwrap();
        assert_eq!(fetched.kind, "success");

        let missing: Option<Sample> = store.get("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_create_conflict() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("s1", "success", 0.9)).unwrap();
        let result = store.create(Sample::new("s1", "failure", 0.1));
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn test_update_and_reindex() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("s1", "success", 0.9)).unwrap();

        let mut record: Sample = store.get("s1").unwrap().unwrap();
        record.kind = "failure".to_string();
        store.update(record).unwrap();

        let failures: Vec<Sample> = store
            .list(&[Filter::eq("kind", IndexValue::String("failure".into()))])
            .unwrap();
        assert_eq!(failures.len(), 1);

        let successes: Vec<Sample> = store
            .list(&[Filter::eq("kind", IndexValue::String("success".into()))])
            .unwrap();
        assert!(successes.is_empty());
    }

    #[test]
    fn test_update_missing_record() {
        let (_temp, mut store) = open_store();
        let result = store.update(Sample::new("ghost", "x", 0.0));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_delete() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("s1", "success", 0.9)).unwrap();
        store.delete::<Sample>("s1").unwrap();

        let missing: Option<Sample> = store.get("s1").unwrap();
        assert!(missing.is_none());

        assert!(matches!(
            store.delete::<Sample>("s1"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_numeric_filter() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("low", "any", 0.2)).unwrap();
        store.create(Sample::new("mid", "any", 0.5)).unwrap();
        store.create(Sample::new("high", "any", 0.9)).unwrap();

        let confident: Vec<Sample> = store.list(&[Filter::gte("score", IndexValue::Float(0.5))]).unwrap();
        assert_eq!(confident.len(), 2);
        assert!(confident.iter().all(|s| s.score >= 0.5));
    }

    #[test]
    fn test_list_combined_filters() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("a", "failure", 0.9)).unwrap();
        store.create(Sample::new("b", "success", 0.9)).unwrap();
        store.create(Sample::new("c", "success", 0.1)).unwrap();

        let results: Vec<Sample> = store
            .list(&[
                Filter::eq("kind", IndexValue::String("success".into())),
                Filter::gte("score", IndexValue::Float(0.5)),
            ])
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn test_rebuild_indexes() {
        let (_temp, mut store) = open_store();

        store.create(Sample::new("a", "x", 0.1)).unwrap();
        store.create(Sample::new("b", "y", 0.2)).unwrap();

        let count = store.rebuild_indexes::<Sample>().unwrap();
        assert_eq!(count, 2);

        let xs: Vec<Sample> = store
            .list(&[Filter::eq("kind", IndexValue::String("x".into()))])
            .unwrap();
        assert_eq!(xs.len(), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("test.db");

        {
            let mut store = Store::open(&db_path).unwrap();
            store.create(Sample::new("s1", "success", 0.9)).unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        let fetched: Sample = store.get("s1").unwrap().unwrap();
        assert_eq!(fetched.id, "s1");
    }

    #[test]
    fn test_compact() {
        let (_temp, mut store) = open_store();
        for i in 0..20 {
            store.create(Sample::new(&format!("s{}", i), "x", 0.5)).unwrap();
        }
        for i in 0..20 {
            store.delete::<Sample>(&format!("s{}", i)).unwrap();
        }
        store.compact().unwrap();
        assert_eq!(store.count::<Sample>().unwrap(), 0);
    }
}
