//! Schema Map and Shared Store
//!
//! The schema map is an in-memory snapshot of every table the connected database
//! exposes: ordered column names, primary key and foreign keys. It is derived state,
//! rebuilt wholesale by the [`sync::SchemaSynchronizer`] on connect and after any
//! structural change, and read by the validator.
//!
//! # Representations
//! Older persisted maps store a table as a bare list of columns; newer ones store a
//! structured descriptor. Both deserialize into [`TableSchema`], so nothing past this
//! boundary ever sees the legacy shape.
//!
//! # Identifier Matching
//! Lookups are exact first. Unquoted identifiers then fall back to an ASCII
//! case-insensitive match, since engines fold unquoted names.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::{SchemaInfo, TableInfo};

pub mod sync;

pub use sync::SchemaSynchronizer;

/// Foreign key edge from a child table to its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub child_columns: Vec<String>,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
}

/// Table descriptor held by the schema map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TableRepr")]
pub struct TableSchema {
    /// Column names in database-reported order
    pub columns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

/// Either persisted shape of a table entry
#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr {
    Columns(Vec<String>),
    Structured {
        columns: Vec<String>,
        #[serde(default)]
        primary_key: Vec<String>,
        #[serde(default)]
        foreign_keys: Vec<ForeignKey>,
    },
}

impl From<TableRepr> for TableSchema {
    fn from(repr: TableRepr) -> Self {
        match repr {
            TableRepr::Columns(columns) => Self::from(columns),
            TableRepr::Structured { columns, primary_key, foreign_keys } => {
                Self { columns, primary_key, foreign_keys }
            }
        }
    }
}

impl From<Vec<String>> for TableSchema {
    fn from(columns: Vec<String>) -> Self {
        Self { columns, primary_key: Vec::new(), foreign_keys: Vec::new() }
    }
}

impl From<&TableInfo> for TableSchema {
    fn from(table: &TableInfo) -> Self {
        Self {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            primary_key: table.primary_key.clone(),
            foreign_keys: table
                .foreign_keys
                .iter()
                .map(|fk| ForeignKey {
                    child_columns: fk.columns.clone(),
                    parent_table: fk.referenced_table.clone(),
                    parent_columns: fk.referenced_columns.clone(),
                })
                .collect(),
        }
    }
}

impl TableSchema {
    /// Whether `column` names one of this table's columns
    ///
    /// `quoted` disables the case-insensitive fallback.
    #[must_use]
    pub fn has_column(&self, column: &str, quoted: bool) -> bool {
        self.columns.iter().any(|c| c == column)
            || (!quoted && self.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }
}

/// Mapping from table name to descriptor, in database-listed order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap {
    tables: IndexMap<String, TableSchema>,
}

impl SchemaMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a table, returning the previous descriptor
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        table: impl Into<TableSchema>,
    ) -> Option<TableSchema> {
        self.tables.insert(name.into(), table.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableSchema)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    /// Resolve a referenced table name to its canonical key and descriptor
    #[must_use]
    pub fn resolve(&self, name: &str, quoted: bool) -> Option<(&str, &TableSchema)> {
        if let Some((key, table)) = self.tables.get_key_value(name) {
            return Some((key.as_str(), table));
        }
        if quoted {
            return None;
        }
        self.tables
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, table)| (key.as_str(), table))
    }
}

impl From<&SchemaInfo> for SchemaMap {
    fn from(info: &SchemaInfo) -> Self {
        info.tables.iter().map(|t| (t.name.clone(), TableSchema::from(t))).collect()
    }
}

impl<S: Into<String>, T: Into<TableSchema>> FromIterator<(S, T)> for SchemaMap {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, table) in iter {
            map.insert(name, table);
        }
        map
    }
}

/// Shared handle to the current schema map
///
/// Readers take an `Arc` snapshot and never block the synchronizer for longer than
/// a pointer clone; replacement swaps the whole map at once.
#[derive(Debug, Default)]
pub struct SchemaStore {
    current: RwLock<Arc<SchemaMap>>,
}

impl SchemaStore {
    #[must_use]
    pub fn new(map: SchemaMap) -> Self {
        Self { current: RwLock::new(Arc::new(map)) }
    }

    /// Current map; stays valid even if a refresh replaces it afterwards
    #[must_use]
    pub fn snapshot(&self) -> Arc<SchemaMap> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, map: SchemaMap) {
        let map = Arc::new(map);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = map;
    }
}
