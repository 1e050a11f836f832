use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::field::{Field, Schema};

use super::{BoxedOperator, Operator, OperatorBase};
use crate::aggregate::{AggregateOps, Aggregator};
use crate::env::ExecEnv;

/// One aggregated input column: which child column, and which operations.
#[derive(Debug, Clone)]
pub struct AggregateField {
    pub column: usize,
    pub ops: AggregateOps,
}

impl AggregateField {
    pub fn new(column: usize, ops: AggregateOps) -> Self {
        AggregateField { column, ops }
    }
}

/// Consumes its entire child and emits a single result row: the requested
/// statistics for each aggregated column, concatenated in field order.
#[derive(Debug)]
pub struct Aggregate {
    base: OperatorBase,
    fields: Vec<AggregateField>,
    /// (field name, type) pairs captured from the child schema, used to
    /// rebuild aggregators on rewind.
    input_fields: Vec<Field>,
    aggregators: Vec<Aggregator>,
    schema: Schema,
    emitted: bool,
}

impl Aggregate {
    pub fn try_new(child: BoxedOperator, fields: Vec<AggregateField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(WeftError::invalid_argument(
                "Aggregate requires at least one aggregated column",
            ));
        }

        let mut input_fields = Vec::with_capacity(fields.len());
        for field_spec in &fields {
            let field = child
                .schema()
                .field(field_spec.column)
                .cloned()
                .ok_or_else(|| {
                    WeftError::invalid_argument(format!(
                        "Aggregate column {} out of range for child with {} columns",
                        field_spec.column,
                        child.schema().num_columns()
                    ))
                })?;
            input_fields.push(field);
        }

        let aggregators = build_aggregators(&fields, &input_fields)?;
        let schema = aggregators
            .iter()
            .flat_map(|agg| agg.result_schema().fields().iter().cloned())
            .collect();

        Ok(Aggregate {
            base: OperatorBase::unary(child),
            fields,
            input_fields,
            aggregators,
            schema,
            emitted: false,
        })
    }

    fn accumulate(&mut self, batch: &TupleBatch) -> Result<()> {
        for (agg, field_spec) in self.aggregators.iter_mut().zip(&self.fields) {
            agg.add_batch_column(batch, field_spec.column)?;
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<TupleBatch>> {
        let mut buffer = TupleBatchBuffer::new(self.schema.clone());
        let mut offset = 0;
        for agg in &self.aggregators {
            agg.get_result(&mut buffer, offset)?;
            offset += agg.ops().len();
        }
        self.emitted = true;
        buffer.pop_any()
    }
}

fn build_aggregators(
    fields: &[AggregateField],
    input_fields: &[Field],
) -> Result<Vec<Aggregator>> {
    fields
        .iter()
        .zip(input_fields)
        .map(|(field_spec, field)| Aggregator::try_new(&field.name, field.datatype, field_spec.ops))
        .collect()
}

impl Operator for Aggregate {
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
        if self.emitted {
            return Ok(None);
        }
        loop {
            let polled = self.base.child_mut(0)?.next()?;
            match polled {
                Some(batch) => self.accumulate(&batch)?,
                None => {
                    let child_eoi = self.base.children()[0].eoi();
                    if child_eoi {
                        self.base.set_eoi();
                        return Ok(None);
                    }
                    return self.emit();
                }
            }
        }
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        if self.emitted {
            self.base.set_eos();
            return Ok(None);
        }
        let polled = self.base.child_mut(0)?.next_ready()?;
        match polled {
            Some(batch) => {
                self.accumulate(&batch)?;
                Ok(None)
            }
            None => {
                let child = &self.base.children()[0];
                if child.eos() {
                    self.emit()
                } else {
                    if child.eoi() {
                        self.base.set_eoi();
                    }
                    Ok(None)
                }
            }
        }
    }

    fn rewind_inner(&mut self, _env: &ExecEnv) -> Result<()> {
        self.aggregators = build_aggregators(&self.fields, &self.input_fields)?;
        self.emitted = false;
        Ok(())
    }
}
