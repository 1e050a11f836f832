use weft_error::Result;
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{BoxedOperator, Operator, OperatorBase};

/// Relational projection: selects a subset/reordering of the child's columns
/// by index. Column storage is shared with the child's batches.
#[derive(Debug)]
pub struct Project {
    base: OperatorBase,
    field_ids: Vec<usize>,
    schema: Schema,
}

impl Project {
    pub fn try_new(child: BoxedOperator, field_ids: Vec<usize>) -> Result<Self> {
        let schema = child.schema().project(&field_ids)?;
        Ok(Project {
            base: OperatorBase::unary(child),
            field_ids,
            schema,
        })
    }
}

impl Operator for Project {
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
        let polled = self.base.child_mut(0)?.next()?;
        match polled {
            Some(batch) => Ok(Some(batch.project(&self.field_ids)?)),
            None => {
                let child_eoi = self.base.children()[0].eoi();
                if child_eoi {
                    self.base.set_eoi();
                }
                Ok(None)
            }
        }
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        let polled = self.base.child_mut(0)?.next_ready()?;
        match polled {
            Some(batch) => Ok(Some(batch.project(&self.field_ids)?)),
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
