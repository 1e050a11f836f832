use std::fmt;

use weft_error::{Result, WeftError};
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::column::Column;
use weft_sheaf::datatype::DataType;
use weft_sheaf::field::{Field, Schema};
use weft_sheaf::scalar::ScalarValue;

use super::{AggregateOp, AggregateOps};

/// Storage-level behavior of a numeric value type.
///
/// Sums widen: integer sums accumulate in 64 bits (wrapping, like the
/// original system's long arithmetic), float sums in f64. Averages are
/// always f64.
pub trait NumericType: Copy + PartialOrd + fmt::Debug + Send + 'static {
    const DATATYPE: DataType;
    const SUM_DATATYPE: DataType;

    type Acc: Copy + Default + fmt::Debug + Send;

    fn accumulate(acc: Self::Acc, value: Self) -> Self::Acc;
    fn acc_as_f64(acc: Self::Acc) -> f64;
    fn put(buffer: &mut TupleBatchBuffer, column: usize, value: Self) -> Result<()>;
    fn put_acc(buffer: &mut TupleBatchBuffer, column: usize, acc: Self::Acc) -> Result<()>;
    fn column_slice(column: &Column) -> Result<&[Self]>;
    fn from_scalar(value: &ScalarValue) -> Result<Self>;
}

impl NumericType for i32 {
    const DATATYPE: DataType = DataType::Int32;
    const SUM_DATATYPE: DataType = DataType::Int64;

    type Acc = i64;

    fn accumulate(acc: i64, value: i32) -> i64 {
        acc.wrapping_add(value as i64)
    }

    fn acc_as_f64(acc: i64) -> f64 {
        acc as f64
    }

    fn put(buffer: &mut TupleBatchBuffer, column: usize, value: i32) -> Result<()> {
        buffer.put_int32(column, value)
    }

    fn put_acc(buffer: &mut TupleBatchBuffer, column: usize, acc: i64) -> Result<()> {
        buffer.put_int64(column, acc)
    }

    fn column_slice(column: &Column) -> Result<&[i32]> {
        column.try_int32()
    }

    fn from_scalar(value: &ScalarValue) -> Result<i32> {
        match value {
            ScalarValue::Int32(v) => Ok(*v),
            other => Err(scalar_type_err(DataType::Int32, other)),
        }
    }
}

impl NumericType for i64 {
    const DATATYPE: DataType = DataType::Int64;
    const SUM_DATATYPE: DataType = DataType::Int64;

    type Acc = i64;

    fn accumulate(acc: i64, value: i64) -> i64 {
        acc.wrapping_add(value)
    }

    fn acc_as_f64(acc: i64) -> f64 {
        acc as f64
    }

    fn put(buffer: &mut TupleBatchBuffer, column: usize, value: i64) -> Result<()> {
        buffer.put_int64(column, value)
    }

    fn put_acc(buffer: &mut TupleBatchBuffer, column: usize, acc: i64) -> Result<()> {
        buffer.put_int64(column, acc)
    }

    fn column_slice(column: &Column) -> Result<&[i64]> {
        column.try_int64()
    }

    fn from_scalar(value: &ScalarValue) -> Result<i64> {
        match value {
            ScalarValue::Int64(v) => Ok(*v),
            other => Err(scalar_type_err(DataType::Int64, other)),
        }
    }
}

impl NumericType for f32 {
    const DATATYPE: DataType = DataType::Float32;
    const SUM_DATATYPE: DataType = DataType::Float64;

    type Acc = f64;

    fn accumulate(acc: f64, value: f32) -> f64 {
        acc + value as f64
    }

    fn acc_as_f64(acc: f64) -> f64 {
        acc
    }

    fn put(buffer: &mut TupleBatchBuffer, column: usize, value: f32) -> Result<()> {
        buffer.put_float32(column, value)
    }

    fn put_acc(buffer: &mut TupleBatchBuffer, column: usize, acc: f64) -> Result<()> {
        buffer.put_float64(column, acc)
    }

    fn column_slice(column: &Column) -> Result<&[f32]> {
        column.try_float32()
    }

    fn from_scalar(value: &ScalarValue) -> Result<f32> {
        match value {
            ScalarValue::Float32(v) => Ok(*v),
            other => Err(scalar_type_err(DataType::Float32, other)),
        }
    }
}

impl NumericType for f64 {
    const DATATYPE: DataType = DataType::Float64;
    const SUM_DATATYPE: DataType = DataType::Float64;

    type Acc = f64;

    fn accumulate(acc: f64, value: f64) -> f64 {
        acc + value
    }

    fn acc_as_f64(acc: f64) -> f64 {
        acc
    }

    fn put(buffer: &mut TupleBatchBuffer, column: usize, value: f64) -> Result<()> {
        buffer.put_float64(column, value)
    }

    fn put_acc(buffer: &mut TupleBatchBuffer, column: usize, acc: f64) -> Result<()> {
        buffer.put_float64(column, acc)
    }

    fn column_slice(column: &Column) -> Result<&[f64]> {
        column.try_float64()
    }

    fn from_scalar(value: &ScalarValue) -> Result<f64> {
        match value {
            ScalarValue::Float64(v) => Ok(*v),
            other => Err(scalar_type_err(DataType::Float64, other)),
        }
    }
}

fn scalar_type_err(expected: DataType, got: &ScalarValue) -> WeftError {
    WeftError::invalid_argument(format!(
        "Expected {expected} value, got {}",
        got.datatype()
    ))
}

/// Incremental count/min/max/sum/avg over one numeric column or scalar
/// stream.
#[derive(Debug)]
pub struct NumericAggregator<T: NumericType> {
    ops: AggregateOps,
    compute_min: bool,
    compute_max: bool,
    compute_sum: bool,
    count: i64,
    min: Option<T>,
    max: Option<T>,
    sum: T::Acc,
    result_schema: Schema,
}

impl<T: NumericType> NumericAggregator<T> {
    pub fn try_new(field: &str, ops: AggregateOps) -> Result<Self> {
        ops.validate_for(T::DATATYPE)?;

        let result_schema = ops
            .iter()
            .map(|op| {
                let datatype = match op {
                    AggregateOp::Count => DataType::Int64,
                    AggregateOp::Min | AggregateOp::Max => T::DATATYPE,
                    AggregateOp::Sum => T::SUM_DATATYPE,
                    AggregateOp::Avg => DataType::Float64,
                };
                Field::new(format!("{}_{field}", op.prefix()), datatype)
            })
            .collect();

        Ok(NumericAggregator {
            ops,
            compute_min: ops.contains(AggregateOp::Min),
            compute_max: ops.contains(AggregateOp::Max),
            // The average needs the running sum too.
            compute_sum: ops.contains(AggregateOp::Sum) || ops.contains(AggregateOp::Avg),
            count: 0,
            min: None,
            max: None,
            sum: T::Acc::default(),
            result_schema,
        })
    }

    pub fn ops(&self) -> AggregateOps {
        self.ops
    }

    pub fn result_schema(&self) -> &Schema {
        &self.result_schema
    }

    pub fn add(&mut self, value: T) {
        self.count += 1;
        if self.compute_min && self.min.map(|m| value < m).unwrap_or(true) {
            self.min = Some(value);
        }
        if self.compute_max && self.max.map(|m| value > m).unwrap_or(true) {
            self.max = Some(value);
        }
        if self.compute_sum {
            self.sum = T::accumulate(self.sum, value);
        }
    }

    pub fn add_scalar(&mut self, value: &ScalarValue) -> Result<()> {
        self.add(T::from_scalar(value)?);
        Ok(())
    }

    pub fn add_column(&mut self, column: &Column) -> Result<()> {
        for &value in T::column_slice(column)? {
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
                    T::put(buffer, idx, min)?;
                }
                AggregateOp::Max => {
                    let max = self.max.ok_or_else(|| empty_stream_err(op))?;
                    T::put(buffer, idx, max)?;
                }
                AggregateOp::Sum => {
                    if self.count == 0 {
                        return Err(empty_stream_err(op));
                    }
                    T::put_acc(buffer, idx, self.sum)?;
                }
                AggregateOp::Avg => {
                    if self.count == 0 {
                        return Err(empty_stream_err(op));
                    }
                    buffer.put_float64(idx, T::acc_as_f64(self.sum) / self.count as f64)?;
                }
            }
            idx += 1;
        }
        Ok(())
    }
}

pub(crate) fn empty_stream_err(op: AggregateOp) -> WeftError {
    WeftError::data(format!("Cannot produce {op} over an empty value stream"))
}
