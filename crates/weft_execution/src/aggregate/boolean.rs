use weft_error::{Result, WeftError};
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::column::Column;
use weft_sheaf::datatype::DataType;
use weft_sheaf::field::{Field, Schema};
use weft_sheaf::scalar::ScalarValue;

use super::numeric::empty_stream_err;
use super::{AggregateOp, AggregateOps};

/// Count/min/max over a boolean column (`false < true`).
#[derive(Debug)]
pub struct BooleanAggregator {
    ops: AggregateOps,
    count: i64,
    min: Option<bool>,
    max: Option<bool>,
    result_schema: Schema,
}

impl BooleanAggregator {
    pub fn try_new(field: &str, ops: AggregateOps) -> Result<Self> {
        ops.validate_for(DataType::Boolean)?;

        let result_schema = ops
            .iter()
            .map(|op| {
                let datatype = match op {
                    AggregateOp::Count => DataType::Int64,
                    AggregateOp::Min | AggregateOp::Max => DataType::Boolean,
                    other => unreachable!("{other} rejected by validate_for"),
                };
                Field::new(format!("{}_{field}", op.prefix()), datatype)
            })
            .collect();

        Ok(BooleanAggregator {
            ops,
            count: 0,
            min: None,
            max: None,
            result_schema,
        })
    }

    pub fn ops(&self) -> AggregateOps {
        self.ops
    }

    pub fn result_schema(&self) -> &Schema {
        &self.result_schema
    }

    pub fn add(&mut self, value: bool) {
        self.count += 1;
        if self.min.map(|m| value < m).unwrap_or(true) {
            self.min = Some(value);
        }
        if self.max.map(|m| value > m).unwrap_or(true) {
            self.max = Some(value);
        }
    }

    pub fn add_scalar(&mut self, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Boolean(v) => {
                self.add(*v);
                Ok(())
            }
            other => Err(WeftError::invalid_argument(format!(
                "Expected Boolean value, got {}",
                other.datatype()
            ))),
        }
    }

    pub fn add_column(&mut self, column: &Column) -> Result<()> {
        for &value in column.try_boolean()? {
            self.add(value);
        }
        Ok(())
    }

    pub fn get_result(&self, buffer: &mut TupleBatchBuffer, offset: usize) -> Result<()> {
        let mut idx = offset;
        for op in self.ops.iter() {
            match op {
                AggregateOp::Count => buffer.put_int64(idx, self.count)?,
                AggregateOp::Min => {
                    let min = self.min.ok_or_else(|| empty_stream_err(op))?;
                    buffer.put_bool(idx, min)?;
                }
                AggregateOp::Max => {
                    let max = self.max.ok_or_else(|| empty_stream_err(op))?;
                    buffer.put_bool(idx, max)?;
                }
                other => unreachable!("{other} rejected by validate_for"),
            }
            idx += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_over_booleans() {
        let ops = AggregateOps::of(&[AggregateOp::Count, AggregateOp::Min, AggregateOp::Max]);
        let mut agg = BooleanAggregator::try_new("flag", ops).unwrap();
        agg.add_column(&Column::Boolean(vec![true, false, true])).unwrap();

        let mut buffer = TupleBatchBuffer::new(agg.result_schema().clone());
        agg.get_result(&mut buffer, 0).unwrap();
        let batch = buffer.pop_any().unwrap().unwrap();
        assert_eq!(&[3i64], batch.column(0).unwrap().try_int64().unwrap());
        assert_eq!(&[false], batch.column(1).unwrap().try_boolean().unwrap());
        assert_eq!(&[true], batch.column(2).unwrap().try_boolean().unwrap());
    }
}
