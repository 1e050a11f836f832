use std::sync::Arc;

use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::root::BatchSink;
use crate::env::ExecEnv;
use crate::storage::{RelationKey, TableStore};

/// Sink appending consumed batches to a stored relation.
///
/// The storage engine itself is the external [`TableStore`] collaborator
/// supplied through the execution environment; this sink only owns the
/// create/append protocol.
#[derive(Debug)]
pub struct TableInsert {
    relation: RelationKey,
    overwrite: bool,
    store: Option<Arc<dyn TableStore>>,
}

impl TableInsert {
    /// Insert appending to the relation, creating it if missing.
    pub fn new(relation: RelationKey) -> Self {
        TableInsert {
            relation,
            overwrite: false,
            store: None,
        }
    }

    /// Insert dropping any existing contents first.
    pub fn with_overwrite(relation: RelationKey) -> Self {
        TableInsert {
            relation,
            overwrite: true,
            store: None,
        }
    }
}

impl BatchSink for TableInsert {
    fn init(&mut self, env: &ExecEnv, child_schema: &Schema) -> Result<()> {
        let store = env.table_store()?;
        store.create_table(&self.relation, child_schema, self.overwrite)?;
        self.store = Some(store);
        Ok(())
    }

    fn consume(&mut self, batch: &TupleBatch) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| WeftError::illegal_state("TableInsert consumed before init"))?;
        store.append(&self.relation, batch)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.store = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::root::RootOperator;
    use crate::operators::tuple_source::TupleSource;
    use crate::operators::Operator;
    use crate::storage::MemoryTableStore;
    use weft_error::ErrorKind;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    fn source() -> Box<TupleSource> {
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let batch = TupleBatch::try_new(schema, [Column::Int32(vec![1, 2, 3])]).unwrap();
        Box::new(TupleSource::try_new(vec![batch]).unwrap())
    }

    #[test]
    fn inserts_all_rows() {
        let store = Arc::new(MemoryTableStore::new());
        let env = ExecEnv::builder().table_store(store.clone()).build();
        let key = RelationKey::new("test", "insert", "rows");

        let mut root = RootOperator::new(source(), TableInsert::new(key.clone()));
        root.open(&env).unwrap();
        assert!(root.next().unwrap().is_none());
        root.cleanup().unwrap();

        assert_eq!(Some(3), store.num_rows(&key));
    }

    #[test]
    fn missing_store_fails_init_with_config_error() {
        let env = ExecEnv::default();
        let key = RelationKey::new("test", "insert", "rows");
        let mut root = RootOperator::new(source(), TableInsert::new(key));
        let err = root.open(&env).unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
    }
}
