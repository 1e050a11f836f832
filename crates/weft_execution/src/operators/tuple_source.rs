use std::collections::VecDeque;

use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{Operator, OperatorBase};

/// Leaf source emitting a fixed list of batches, then EOS.
///
/// The workhorse source for tests and for replaying materialized data.
#[derive(Debug)]
pub struct TupleSource {
    base: OperatorBase,
    schema: Schema,
    batches: VecDeque<TupleBatch>,
}

impl TupleSource {
    /// Source over one or more batches; all must agree on column types.
    pub fn try_new(batches: Vec<TupleBatch>) -> Result<Self> {
        let first = batches.first().ok_or_else(|| {
            WeftError::invalid_argument("TupleSource requires at least one batch; use with_schema for an empty source")
        })?;
        let schema = first.schema().clone();
        Self::with_schema(schema, batches)
    }

    /// Source with an explicit schema, allowing an empty batch list.
    pub fn with_schema(schema: Schema, batches: Vec<TupleBatch>) -> Result<Self> {
        for (idx, batch) in batches.iter().enumerate() {
            if batch.schema().datatypes().collect::<Vec<_>>()
                != schema.datatypes().collect::<Vec<_>>()
            {
                return Err(WeftError::invalid_argument(format!(
                    "Batch {idx} does not match the source schema"
                )));
            }
        }
        Ok(TupleSource {
            base: OperatorBase::leaf(),
            schema,
            batches: batches.into(),
        })
    }
}

impl Operator for TupleSource {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn fetch_next(&mut self) -> Result<Option<TupleBatch>> {
        Ok(self.batches.pop_front())
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        match self.batches.pop_front() {
            Some(batch) => Ok(Some(batch)),
            None => {
                self.base.set_eos();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ExecEnv;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    #[test]
    fn empty_source_is_immediately_exhausted() {
        let env = ExecEnv::default();
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let mut source = TupleSource::with_schema(schema, vec![]).unwrap();
        source.open(&env).unwrap();
        assert!(source.next_ready().unwrap().is_none());
        assert!(source.eos());
    }

    #[test]
    fn schema_mismatch_rejected() {
        let a = TupleBatch::try_new(
            Schema::new([Field::new("x", DataType::Int32)]),
            [Column::Int32(vec![1])],
        )
        .unwrap();
        let b = TupleBatch::try_new(
            Schema::new([Field::new("x", DataType::Int64)]),
            [Column::Int64(vec![1])],
        )
        .unwrap();
        TupleSource::try_new(vec![a, b]).expect_err("mixed types should fail");
    }
}
