use std::sync::Arc;

use weft_error::{Result, WeftError};

use crate::column::Column;
use crate::field::Schema;
use crate::scalar::ScalarValue;

/// Maximum number of rows in a single batch.
pub const BATCH_SIZE: usize = 10_000;

/// An immutable, schema-conformant block of rows stored column-major.
///
/// Columns are reference counted; transformations that only touch the schema
/// (`project`, `rename`) share the underlying column storage with the source
/// batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleBatch {
    schema: Schema,
    columns: Vec<Arc<Column>>,
    num_rows: usize,
}

impl TupleBatch {
    /// Create a new batch, validating schema conformance.
    ///
    /// Every column must match its field's type and all columns must have the
    /// same length, bounded by [`BATCH_SIZE`].
    pub fn try_new(schema: Schema, columns: impl IntoIterator<Item = Column>) -> Result<Self> {
        let columns: Vec<_> = columns.into_iter().map(Arc::new).collect();
        Self::try_from_shared(schema, columns)
    }

    pub fn try_from_shared(schema: Schema, columns: Vec<Arc<Column>>) -> Result<Self> {
        if columns.len() != schema.num_columns() {
            return Err(WeftError::invalid_argument(format!(
                "Expected {} columns for schema, got {}",
                schema.num_columns(),
                columns.len()
            )));
        }

        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for (idx, (column, field)) in columns.iter().zip(schema.fields()).enumerate() {
            if column.datatype() != field.datatype {
                return Err(WeftError::invalid_argument(format!(
                    "Column {idx} has type {}, schema says {}",
                    column.datatype(),
                    field.datatype
                )));
            }
            if column.len() != num_rows {
                return Err(WeftError::invalid_argument(format!(
                    "Expected column length to be {num_rows}, got {}. Column idx: {idx}",
                    column.len()
                )));
            }
        }

        if num_rows > BATCH_SIZE {
            return Err(WeftError::invalid_argument(format!(
                "Batch of {num_rows} rows exceeds capacity of {BATCH_SIZE}"
            )));
        }

        Ok(TupleBatch {
            schema,
            columns,
            num_rows,
        })
    }

    pub fn empty(schema: Schema) -> Self {
        let columns = schema
            .datatypes()
            .map(|dt| {
                Arc::new(
                    crate::column::ColumnBuilder::for_datatype(dt).finish(),
                )
            })
            .collect();
        TupleBatch {
            schema,
            columns,
            num_rows: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx).map(|c| c.as_ref())
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Get a single cell as an owned scalar.
    pub fn value(&self, column: usize, row: usize) -> Result<ScalarValue> {
        let col = self.columns.get(column).ok_or_else(|| {
            WeftError::invalid_argument(format!(
                "Column {column} out of range for batch with {} columns",
                self.columns.len()
            ))
        })?;
        col.value(row)
    }

    /// Select a subset/reordering of columns by index.
    ///
    /// Column storage is shared with the source batch; only the schema is
    /// rebuilt. Fails on any out-of-range index.
    pub fn project(&self, indices: &[usize]) -> Result<TupleBatch> {
        let schema = self.schema.project(indices)?;
        let columns = indices.iter().map(|&idx| self.columns[idx].clone()).collect();

        Ok(TupleBatch {
            schema,
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Replace the schema's column names, preserving types, order, and data.
    ///
    /// Fails if the number of names doesn't match the number of columns.
    pub fn rename(&self, names: impl IntoIterator<Item = String>) -> Result<TupleBatch> {
        let schema = self.schema.rename(names)?;
        Ok(TupleBatch {
            schema,
            columns: self.columns.clone(),
            num_rows: self.num_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::field::Field;

    fn test_batch() -> TupleBatch {
        let schema = Schema::new([
            Field::new("string", DataType::Utf8),
            Field::new("int", DataType::Int32),
        ]);
        let strings = Column::Utf8((0..100).map(|i| format!("val{i}")).collect());
        let ints = Column::Int32((0..100).collect());
        TupleBatch::try_new(schema, [strings, ints]).unwrap()
    }

    #[test]
    fn schema_data_consistency() {
        let batch = test_batch();
        assert_eq!(batch.num_columns(), batch.schema().num_columns());
        for idx in 0..batch.num_columns() {
            assert_eq!(batch.num_rows(), batch.column(idx).unwrap().len());
        }
    }

    #[test]
    fn mismatched_column_length() {
        let schema = Schema::new([
            Field::new("a", DataType::Int32),
            Field::new("b", DataType::Int32),
        ]);
        TupleBatch::try_new(schema, [Column::Int32(vec![1, 2]), Column::Int32(vec![1])])
            .expect_err("length mismatch should fail");
    }

    #[test]
    fn mismatched_column_type() {
        let schema = Schema::new([Field::new("a", DataType::Int64)]);
        TupleBatch::try_new(schema, [Column::Int32(vec![1, 2])])
            .expect_err("type mismatch should fail");
    }

    #[test]
    fn project_correctness() {
        let batch = test_batch();
        let projected = batch.project(&[1]).unwrap();
        assert_eq!(1, projected.num_columns());
        assert_eq!(
            vec![DataType::Int32],
            projected.schema().datatypes().collect::<Vec<_>>()
        );
        for row in 0..batch.num_rows() {
            assert_eq!(batch.value(1, row).unwrap(), projected.value(0, row).unwrap());
        }

        batch.project(&[0, 2]).expect_err("index 2 out of range");
    }

    #[test]
    fn project_shares_storage() {
        let batch = test_batch();
        let projected = batch.project(&[0, 1]).unwrap();
        assert!(Arc::ptr_eq(&batch.columns()[0], &projected.columns()[0]));
        assert!(Arc::ptr_eq(&batch.columns()[1], &projected.columns()[1]));
    }

    #[test]
    fn rename_round_trip() {
        let batch = test_batch();
        let renamed = batch
            .rename(["stringNew".to_string(), "intNew".to_string()])
            .unwrap();

        assert_eq!(
            batch.schema().datatypes().collect::<Vec<_>>(),
            renamed.schema().datatypes().collect::<Vec<_>>()
        );
        assert_eq!(
            vec!["stringNew", "intNew"],
            renamed.schema().names().collect::<Vec<_>>()
        );
        assert_eq!(batch.num_columns(), renamed.num_columns());
        assert_eq!(batch.num_rows(), renamed.num_rows());

        for row in 0..renamed.num_rows() {
            for column in 0..renamed.num_columns() {
                assert_eq!(
                    batch.value(column, row).unwrap(),
                    renamed.value(column, row).unwrap()
                );
            }
        }

        // Data is shared, not copied.
        assert!(Arc::ptr_eq(&batch.columns()[0], &renamed.columns()[0]));
    }

    #[test]
    fn rename_too_many_columns() {
        let batch = test_batch();
        batch
            .rename([
                "stringNew".to_string(),
                "intNew".to_string(),
                "badExtraColumn".to_string(),
            ])
            .expect_err("three names for two columns should fail");
    }

    #[test]
    fn rename_too_few_columns() {
        let batch = test_batch();
        batch
            .rename(["onlyOneColumn".to_string()])
            .expect_err("one name for two columns should fail");
    }
}
