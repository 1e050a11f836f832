use std::fmt;

use weft_error::Result;
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::field::Schema;

use super::{BoxedOperator, Operator, OperatorBase};

pub type RowPredicate = Box<dyn Fn(&TupleBatch, usize) -> Result<bool> + Send>;

/// Pass-through operator keeping only rows the predicate accepts.
///
/// Surviving rows are rebuilt through a batch buffer, so output batches no
/// longer share storage with the input.
pub struct Filter {
    base: OperatorBase,
    predicate: RowPredicate,
    schema: Schema,
}

impl Filter {
    pub fn new(child: BoxedOperator, predicate: RowPredicate) -> Self {
        let schema = child.schema().clone();
        Filter {
            base: OperatorBase::unary(child),
            predicate,
            schema,
        }
    }

    fn apply(&self, batch: &TupleBatch) -> Result<Option<TupleBatch>> {
        let mut buffer = TupleBatchBuffer::new(self.schema.clone());
        for row in 0..batch.num_rows() {
            if (self.predicate)(batch, row)? {
                buffer.append_row(batch, row)?;
            }
        }
        buffer.pop_any()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("base", &self.base)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Operator for Filter {
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
        loop {
            let polled = self.base.child_mut(0)?.next()?;
            match polled {
                Some(batch) => {
                    if let Some(kept) = self.apply(&batch)? {
                        return Ok(Some(kept));
                    }
                    // Every row filtered out, keep pulling.
                }
                None => {
                    let child_eoi = self.base.children()[0].eoi();
                    if child_eoi {
                        self.base.set_eoi();
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        let polled = self.base.child_mut(0)?.next_ready()?;
        match polled {
            Some(batch) => self.apply(&batch),
            None => {
                let child = &self.base.children()[0];
                if child.eos() {
                    self.base.set_eos();
                } else if child.eoi() {
                    self.base.set_eoi();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ExecEnv;
    use crate::operators::tuple_source::TupleSource;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    #[test]
    fn keeps_only_matching_rows() {
        let env = ExecEnv::default();
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let batch =
            TupleBatch::try_new(schema, [Column::Int32((0..10).collect())]).unwrap();
        let source = Box::new(TupleSource::try_new(vec![batch]).unwrap());

        let mut filter = Filter::new(
            source,
            Box::new(|batch, row| {
                let vals = batch.column(0).unwrap().try_int32()?;
                Ok(vals[row] % 2 == 0)
            }),
        );

        filter.open(&env).unwrap();
        let out = filter.next().unwrap().unwrap();
        assert_eq!(&[0, 2, 4, 6, 8], out.column(0).unwrap().try_int32().unwrap());
        assert!(filter.next().unwrap().is_none());
        assert!(filter.eos());
    }

    #[test]
    fn all_rows_filtered_reaches_eos() {
        let env = ExecEnv::default();
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let batch = TupleBatch::try_new(schema, [Column::Int32(vec![1, 3, 5])]).unwrap();
        let source = Box::new(TupleSource::try_new(vec![batch]).unwrap());

        let mut filter = Filter::new(source, Box::new(|_, _| Ok(false)));
        filter.open(&env).unwrap();
        assert!(filter.next().unwrap().is_none());
        assert!(filter.eos());
    }
}
