//! patternstore - generic indexed record persistence over SQLite
//!
//! A small single-file store for serde-serializable records with secondary
//! indexes. Records declare which of their fields are indexed; the store
//! keeps an index table in sync on every write so filtered queries stay
//! linear in the result set rather than the collection.
//!
//! # Usage
//!
//! ```no_run
//! use patternstore::{Filter, FilterOp, IndexValue, Record, Store, now_ms};
//! use serde::{Deserialize, Serialize};
//! use std::collections::HashMap;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note { id: String, kind: String, updated_at: i64 }
//!
//! impl Record for Note {
//!     fn id(&self) -> &str { &self.id }
//!     fn updated_at(&self) -> i64 { self.updated_at }
//!     fn collection_name() -> &'static str { "notes" }
//!     fn indexed_fields(&self) -> HashMap<String, IndexValue> {
//!         HashMap::from([("kind".to_string(), IndexValue::String(self.kind.clone()))])
//!     }
//! }
//!
//! let mut store = Store::open("notes.db").unwrap();
//! store.create(Note { id: "n1".into(), kind: "todo".into(), updated_at: now_ms() }).unwrap();
//! let todos: Vec<Note> = store
//!     .list(&[Filter::eq("kind", IndexValue::String("todo".into()))])
//!     .unwrap();
//! assert_eq!(todos.len(), 1);
//! ```

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

mod error;
mod store;

pub use error::StoreError;
pub use store::Store;

/// Current Unix time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A record that can be persisted in a [`Store`]
///
/// Implementors pick a collection name and declare which fields participate
/// in secondary indexes. The serialized body is opaque to the store.
pub trait Record: Serialize + DeserializeOwned {
    /// Stable unique identifier within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Name of the collection this record belongs to
    fn collection_name() -> &'static str;

    /// Fields to maintain in the secondary index
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// A value stored in the secondary index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Float(f64),
}

impl IndexValue {
    /// Textual form used for string-typed comparisons
    pub fn as_text(&self) -> Option<&str> {
        match self {
            IndexValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric form used for range comparisons
    pub fn as_num(&self) -> Option<f64> {
        match self {
            IndexValue::Int(n) => Some(*n as f64),
            IndexValue::Float(f) => Some(*f),
            IndexValue::String(_) => None,
        }
    }
}

/// Comparison operator for index filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gte,
    Lte,
}

/// A single filter over an indexed field
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    /// Greater-or-equal filter (numeric fields)
    pub fn gte(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte,
            value,
        }
    }

    /// Less-or-equal filter (numeric fields)
    pub fn lte(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte,
            value,
        }
    }
}
