use weft_error::{Result, WeftError};
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::column::Column;
use weft_sheaf::datatype::DataType;
use weft_sheaf::field::{Field, Schema};
use weft_sheaf::scalar::ScalarValue;

use super::numeric::empty_stream_err;
use super::{AggregateOp, AggregateOps};

/// Count/min/max over a string column, with lexicographic comparison.
#[derive(Debug)]
pub struct StringAggregator {
    ops: AggregateOps,
    compute_min: bool,
    compute_max: bool,
    count: i64,
    min: Option<String>,
    max: Option<String>,
    result_schema: Schema,
}

impl StringAggregator {
    pub fn try_new(field: &str, ops: AggregateOps) -> Result<Self> {
        ops.validate_for(DataType::Utf8)?;

        let result_schema = ops
            .iter()
            .map(|op| {
                let datatype = match op {
                    AggregateOp::Count => DataType::Int64,
                    AggregateOp::Min | AggregateOp::Max => DataType::Utf8,
                    other => unreachable!("{other} rejected by validate_for"),
                };
                Field::new(format!("{}_{field}", op.prefix()), datatype)
            })
            .collect();

        Ok(StringAggregator {
            ops,
            compute_min: ops.contains(AggregateOp::Min),
            compute_max: ops.contains(AggregateOp::Max),
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

    pub fn add(&mut self, value: &str) {
        self.count += 1;
        if self.compute_min
            && self.min.as_deref().map(|m| value < m).unwrap_or(true)
        {
            self.min = Some(value.to_string());
        }
        if self.compute_max
            && self.max.as_deref().map(|m| value > m).unwrap_or(true)
        {
            self.max = Some(value.to_string());
        }
    }

    pub fn add_scalar(&mut self, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Utf8(v) => {
                self.add(v);
                Ok(())
            }
            other => Err(WeftError::invalid_argument(format!(
                "Expected Utf8 value, got {}",
                other.datatype()
            ))),
        }
    }

    pub fn add_column(&mut self, column: &Column) -> Result<()> {
        for value in column.try_utf8()? {
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
                    let min = self.min.clone().ok_or_else(|| empty_stream_err(op))?;
                    buffer.put_utf8(idx, min)?;
                }
                AggregateOp::Max => {
                    let max = self.max.clone().ok_or_else(|| empty_stream_err(op))?;
                    buffer.put_utf8(idx, max)?;
                }
                other => unreachable!("{other} rejected by validate_for"),
            }
            idx += 1;
        }
        Ok(())
    }
}
