use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{BoxedOperator, Operator, OperatorBase};

/// N-ary concatenation: emits every child's stream in child order.
///
/// Children must agree positionally on column types; the output schema is
/// the first child's (names included).
#[derive(Debug)]
pub struct UnionAll {
    base: OperatorBase,
    schema: Schema,
    current: usize,
}

impl UnionAll {
    pub fn try_new(children: Vec<BoxedOperator>) -> Result<Self> {
        let first = children.first().ok_or_else(|| {
            WeftError::invalid_argument("UnionAll requires at least one child")
        })?;
        let schema = first.schema().clone();
        for (idx, child) in children.iter().enumerate().skip(1) {
            if child.schema().datatypes().collect::<Vec<_>>()
                != schema.datatypes().collect::<Vec<_>>()
            {
                return Err(WeftError::invalid_argument(format!(
                    "UnionAll child {idx} has incompatible column types"
                )));
            }
        }
        Ok(UnionAll {
            base: OperatorBase::nary(children),
            schema,
            current: 0,
        })
    }
}

impl Operator for UnionAll {
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
        while self.current < self.base.children().len() {
            let idx = self.current;
            let polled = self.base.child_mut(idx)?.next()?;
            match polled {
                Some(batch) => return Ok(Some(batch)),
                None => {
                    let child = &self.base.children()[idx];
                    if child.eoi() {
                        self.base.set_eoi();
                        return Ok(None);
                    }
                    self.current += 1;
                }
            }
        }
        Ok(None)
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        while self.current < self.base.children().len() {
            let idx = self.current;
            let polled = self.base.child_mut(idx)?.next_ready()?;
            match polled {
                Some(batch) => return Ok(Some(batch)),
                None => {
                    let child = &self.base.children()[idx];
                    if child.eos() {
                        self.current += 1;
                        continue;
                    }
                    if child.eoi() {
                        self.base.set_eoi();
                    }
                    return Ok(None);
                }
            }
        }
        self.base.set_eos();
        Ok(None)
    }

    fn rewind_inner(&mut self, _env: &crate::env::ExecEnv) -> Result<()> {
        self.current = 0;
        Ok(())
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

    fn source(vals: Vec<i32>) -> BoxedOperator {
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let batch = TupleBatch::try_new(schema, [Column::Int32(vals)]).unwrap();
        Box::new(TupleSource::try_new(vec![batch]).unwrap())
    }

    #[test]
    fn concatenates_in_child_order() {
        let env = ExecEnv::default();
        let mut union =
            UnionAll::try_new(vec![source(vec![1, 2]), source(vec![3]), source(vec![4, 5])])
                .unwrap();
        union.open(&env).unwrap();

        let mut all = Vec::new();
        while let Some(batch) = union.next().unwrap() {
            all.extend_from_slice(batch.column(0).unwrap().try_int32().unwrap());
        }
        assert_eq!(vec![1, 2, 3, 4, 5], all);
        assert!(union.eos());
    }

    #[test]
    fn incompatible_children_rejected() {
        let schema = Schema::new([Field::new("x", DataType::Int64)]);
        let batch = TupleBatch::try_new(schema, [Column::Int64(vec![1])]).unwrap();
        let other: BoxedOperator = Box::new(TupleSource::try_new(vec![batch]).unwrap());
        UnionAll::try_new(vec![source(vec![1]), other]).expect_err("type mismatch");
    }
}
