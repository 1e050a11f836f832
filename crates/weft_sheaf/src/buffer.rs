use std::collections::VecDeque;

use weft_error::{Result, WeftError};

use crate::batch::{TupleBatch, BATCH_SIZE};
use crate::column::ColumnBuilder;
use crate::field::Schema;
use crate::scalar::ScalarValue;

/// Mutable accumulator that builds batches column-wise.
///
/// Values are appended in round-robin across all columns of one logical row;
/// a row is complete once every column has received a value for it. Complete
/// batches of `capacity` rows are queued internally and drained with
/// [`pop_filled`](Self::pop_filled) / [`pop_any`](Self::pop_any).
#[derive(Debug)]
pub struct TupleBatchBuffer {
    schema: Schema,
    capacity: usize,
    ready: VecDeque<TupleBatch>,
    builders: Vec<ColumnBuilder>,
    /// Rows fully appended to the in-progress builders.
    complete_rows: usize,
    /// Columns of the in-progress row that have received a value.
    cols_ready: usize,
}

impl TupleBatchBuffer {
    pub fn new(schema: Schema) -> Self {
        Self::with_capacity(schema, BATCH_SIZE)
    }

    /// A buffer emitting batches of at most `capacity` rows.
    pub fn with_capacity(schema: Schema, capacity: usize) -> Self {
        let builders = schema
            .datatypes()
            .map(ColumnBuilder::for_datatype)
            .collect();
        TupleBatchBuffer {
            schema,
            capacity: capacity.clamp(1, BATCH_SIZE),
            ready: VecDeque::new(),
            builders,
            complete_rows: 0,
            cols_ready: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of complete rows buffered and not yet popped.
    ///
    /// A partially appended row is not counted until its last column lands.
    pub fn num_tuples(&self) -> usize {
        self.ready.len() * self.capacity + self.complete_rows
    }

    /// Append one value to a column of the in-progress row.
    ///
    /// Errors if the column index is out of range, the value's type doesn't
    /// match the column, or the column already has a value for this row (the
    /// round-robin order was violated).
    pub fn put(&mut self, column: usize, value: ScalarValue) -> Result<()> {
        let num_columns = self.schema.num_columns();
        let builder = self.builders.get_mut(column).ok_or_else(|| {
            WeftError::invalid_argument(format!(
                "Column {column} out of range for buffer with {num_columns} columns"
            ))
        })?;

        if builder.len() != self.complete_rows {
            return Err(WeftError::invalid_argument(format!(
                "Column {column} already has a value for the in-progress row"
            )));
        }

        builder.push_value(value)?;
        self.cols_ready += 1;

        if self.cols_ready == num_columns {
            self.cols_ready = 0;
            self.complete_rows += 1;
            if self.complete_rows == self.capacity {
                self.finish_in_progress()?;
            }
        }

        Ok(())
    }

    pub fn put_bool(&mut self, column: usize, value: bool) -> Result<()> {
        self.put(column, ScalarValue::Boolean(value))
    }

    pub fn put_int32(&mut self, column: usize, value: i32) -> Result<()> {
        self.put(column, ScalarValue::Int32(value))
    }

    pub fn put_int64(&mut self, column: usize, value: i64) -> Result<()> {
        self.put(column, ScalarValue::Int64(value))
    }

    pub fn put_float32(&mut self, column: usize, value: f32) -> Result<()> {
        self.put(column, ScalarValue::Float32(value))
    }

    pub fn put_float64(&mut self, column: usize, value: f64) -> Result<()> {
        self.put(column, ScalarValue::Float64(value))
    }

    pub fn put_utf8(&mut self, column: usize, value: impl Into<String>) -> Result<()> {
        self.put(column, ScalarValue::Utf8(value.into()))
    }

    /// Append one row copied out of a batch.
    pub fn append_row(&mut self, batch: &TupleBatch, row: usize) -> Result<()> {
        for column in 0..batch.num_columns() {
            self.put(column, batch.value(column, row)?)?;
        }
        Ok(())
    }

    /// Append every row of a batch.
    pub fn append_batch(&mut self, batch: &TupleBatch) -> Result<()> {
        for row in 0..batch.num_rows() {
            self.append_row(batch, row)?;
        }
        Ok(())
    }

    /// Pop a queued full batch, if any.
    pub fn pop_filled(&mut self) -> Option<TupleBatch> {
        self.ready.pop_front()
    }

    /// Pop a full batch if one is queued, otherwise whatever complete rows
    /// remain as a partial batch, otherwise `None`.
    ///
    /// Repeated calls drain the buffer to empty. Popping the partial tail
    /// while a row is mid-append is an illegal-state error.
    pub fn pop_any(&mut self) -> Result<Option<TupleBatch>> {
        if let Some(batch) = self.ready.pop_front() {
            return Ok(Some(batch));
        }
        if self.cols_ready != 0 {
            return Err(WeftError::illegal_state(
                "Cannot pop a partial batch while a row is in progress",
            ));
        }
        if self.complete_rows == 0 {
            return Ok(None);
        }
        let batch = self.finish_builders()?;
        Ok(Some(batch))
    }

    fn finish_in_progress(&mut self) -> Result<()> {
        let batch = self.finish_builders()?;
        self.ready.push_back(batch);
        Ok(())
    }

    fn finish_builders(&mut self) -> Result<TupleBatch> {
        let builders = std::mem::replace(
            &mut self.builders,
            self.schema
                .datatypes()
                .map(ColumnBuilder::for_datatype)
                .collect(),
        );
        self.complete_rows = 0;
        TupleBatch::try_new(
            self.schema.clone(),
            builders.into_iter().map(ColumnBuilder::finish),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::field::Field;

    fn two_col_schema() -> Schema {
        Schema::new([
            Field::new("name", DataType::Utf8),
            Field::new("age", DataType::Int32),
        ])
    }

    #[test]
    fn drain_yields_all_appended_rows() {
        let mut buffer = TupleBatchBuffer::with_capacity(two_col_schema(), 10);
        for i in 0..25 {
            buffer.put_utf8(0, format!("name{i}")).unwrap();
            buffer.put_int32(1, i).unwrap();
        }
        assert_eq!(25, buffer.num_tuples());

        let mut total = 0;
        let mut pops = 0;
        while let Some(batch) = buffer.pop_any().unwrap() {
            total += batch.num_rows();
            pops += 1;
        }
        assert_eq!(25, total);
        assert_eq!(3, pops);
        assert_eq!(0, buffer.num_tuples());
        assert!(buffer.pop_any().unwrap().is_none());
    }

    #[test]
    fn round_robin_violation() {
        let mut buffer = TupleBatchBuffer::new(two_col_schema());
        buffer.put_utf8(0, "a").unwrap();
        buffer
            .put_utf8(0, "b")
            .expect_err("second put to column 0 before row completes should fail");
    }

    #[test]
    fn type_mismatch_on_put() {
        let mut buffer = TupleBatchBuffer::new(two_col_schema());
        buffer
            .put_int32(0, 7)
            .expect_err("int into utf8 column should fail");
    }

    #[test]
    fn pop_mid_row_is_illegal() {
        let mut buffer = TupleBatchBuffer::new(two_col_schema());
        buffer.put_utf8(0, "a").unwrap();
        buffer.put_int32(1, 1).unwrap();
        buffer.put_utf8(0, "b").unwrap();
        buffer.pop_any().expect_err("row in progress");
    }

    #[test]
    fn pop_filled_only_returns_full_batches() {
        let mut buffer = TupleBatchBuffer::with_capacity(two_col_schema(), 4);
        for i in 0..6 {
            buffer.put_utf8(0, format!("n{i}")).unwrap();
            buffer.put_int32(1, i).unwrap();
        }
        let full = buffer.pop_filled().expect("one full batch");
        assert_eq!(4, full.num_rows());
        assert!(buffer.pop_filled().is_none());
        assert_eq!(2, buffer.pop_any().unwrap().expect("partial tail").num_rows());
    }

    #[test]
    fn append_batch_round_trips() {
        let schema = two_col_schema();
        let mut buffer = TupleBatchBuffer::new(schema.clone());
        buffer.put_utf8(0, "x").unwrap();
        buffer.put_int32(1, 42).unwrap();
        let batch = buffer.pop_any().unwrap().unwrap();

        let mut other = TupleBatchBuffer::new(schema);
        other.append_batch(&batch).unwrap();
        let copied = other.pop_any().unwrap().unwrap();
        assert_eq!(batch, copied);
    }
}
