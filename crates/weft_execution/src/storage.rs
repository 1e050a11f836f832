//! Interface to the storage collaborator.
//!
//! Actual storage engines live outside this crate; sinks only see the
//! [`TableStore`] trait. [`MemoryTableStore`] is the in-process
//! implementation used by tests and local queries.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

/// Fully qualified name of a stored relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub user: String,
    pub program: String,
    pub relation: String,
}

impl RelationKey {
    pub fn new(
        user: impl Into<String>,
        program: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        RelationKey {
            user: user.into(),
            program: program.into(),
            relation: relation.into(),
        }
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.program, self.relation)
    }
}

/// Batch-append storage handle passed to insert sinks through the execution
/// environment.
pub trait TableStore: fmt::Debug + Send + Sync {
    /// Create a table, or prepare an existing one for appends.
    ///
    /// With `overwrite` set, existing contents are dropped. Without it,
    /// existing contents persist and the schema must match.
    fn create_table(&self, key: &RelationKey, schema: &Schema, overwrite: bool) -> Result<()>;

    /// Append one batch to an existing table.
    fn append(&self, key: &RelationKey, batch: &TupleBatch) -> Result<()>;
}

#[derive(Debug)]
struct StoredTable {
    schema: Schema,
    batches: Vec<TupleBatch>,
}

/// In-process table store.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<RelationKey, StoredTable>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self, key: &RelationKey) -> Option<usize> {
        let tables = self.tables.lock();
        tables
            .get(key)
            .map(|t| t.batches.iter().map(|b| b.num_rows()).sum())
    }

    pub fn scan(&self, key: &RelationKey) -> Option<Vec<TupleBatch>> {
        let tables = self.tables.lock();
        tables.get(key).map(|t| t.batches.clone())
    }
}

impl TableStore for MemoryTableStore {
    fn create_table(&self, key: &RelationKey, schema: &Schema, overwrite: bool) -> Result<()> {
        let mut tables = self.tables.lock();
        match tables.get_mut(key) {
            Some(existing) if overwrite => {
                existing.schema = schema.clone();
                existing.batches.clear();
            }
            Some(existing) => {
                if existing.schema.datatypes().collect::<Vec<_>>()
                    != schema.datatypes().collect::<Vec<_>>()
                {
                    return Err(WeftError::invalid_argument(format!(
                        "Table {key} exists with an incompatible schema"
                    )));
                }
            }
            None => {
                tables.insert(
                    key.clone(),
                    StoredTable {
                        schema: schema.clone(),
                        batches: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn append(&self, key: &RelationKey, batch: &TupleBatch) -> Result<()> {
        let mut tables = self.tables.lock();
        let table = tables.get_mut(key).ok_or_else(|| {
            WeftError::invalid_argument(format!("Cannot append to unknown table {key}"))
        })?;
        if table.schema.datatypes().collect::<Vec<_>>()
            != batch.schema().datatypes().collect::<Vec<_>>()
        {
            return Err(WeftError::invalid_argument(format!(
                "Batch schema does not match table {key}"
            )));
        }
        table.batches.push(batch.clone());
        Ok(())
    }
}
