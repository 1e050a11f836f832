use weft_error::{Result, WeftError};

use crate::datatype::DataType;
use crate::scalar::ScalarValue;

/// Homogeneous columnar storage, immutable once built.
///
/// Batches hold columns behind `Arc` so projections and renames share the
/// underlying buffers instead of copying.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

impl Column {
    pub const fn datatype(&self) -> DataType {
        match self {
            Column::Boolean(_) => DataType::Boolean,
            Column::Int32(_) => DataType::Int32,
            Column::Int64(_) => DataType::Int64,
            Column::Float32(_) => DataType::Float32,
            Column::Float64(_) => DataType::Float64,
            Column::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Boolean(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the value at a row as an owned scalar.
    pub fn value(&self, row: usize) -> Result<ScalarValue> {
        if row >= self.len() {
            return Err(WeftError::invalid_argument(format!(
                "Row {row} out of range for column of length {}",
                self.len()
            )));
        }
        Ok(match self {
            Column::Boolean(v) => ScalarValue::Boolean(v[row]),
            Column::Int32(v) => ScalarValue::Int32(v[row]),
            Column::Int64(v) => ScalarValue::Int64(v[row]),
            Column::Float32(v) => ScalarValue::Float32(v[row]),
            Column::Float64(v) => ScalarValue::Float64(v[row]),
            Column::Utf8(v) => ScalarValue::Utf8(v[row].clone()),
        })
    }

    pub fn try_boolean(&self) -> Result<&[bool]> {
        match self {
            Column::Boolean(v) => Ok(v),
            other => Err(type_err(DataType::Boolean, other.datatype())),
        }
    }

    pub fn try_int32(&self) -> Result<&[i32]> {
        match self {
            Column::Int32(v) => Ok(v),
            other => Err(type_err(DataType::Int32, other.datatype())),
        }
    }

    pub fn try_int64(&self) -> Result<&[i64]> {
        match self {
            Column::Int64(v) => Ok(v),
            other => Err(type_err(DataType::Int64, other.datatype())),
        }
    }

    pub fn try_float32(&self) -> Result<&[f32]> {
        match self {
            Column::Float32(v) => Ok(v),
            other => Err(type_err(DataType::Float32, other.datatype())),
        }
    }

    pub fn try_float64(&self) -> Result<&[f64]> {
        match self {
            Column::Float64(v) => Ok(v),
            other => Err(type_err(DataType::Float64, other.datatype())),
        }
    }

    pub fn try_utf8(&self) -> Result<&[String]> {
        match self {
            Column::Utf8(v) => Ok(v),
            other => Err(type_err(DataType::Utf8, other.datatype())),
        }
    }
}

fn type_err(expected: DataType, got: DataType) -> WeftError {
    WeftError::invalid_argument(format!("Expected {expected} column, got {got}"))
}

/// Mutable builder for a single column.
#[derive(Debug)]
pub enum ColumnBuilder {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

impl ColumnBuilder {
    pub fn for_datatype(datatype: DataType) -> Self {
        match datatype {
            DataType::Boolean => ColumnBuilder::Boolean(Vec::new()),
            DataType::Int32 => ColumnBuilder::Int32(Vec::new()),
            DataType::Int64 => ColumnBuilder::Int64(Vec::new()),
            DataType::Float32 => ColumnBuilder::Float32(Vec::new()),
            DataType::Float64 => ColumnBuilder::Float64(Vec::new()),
            DataType::Utf8 => ColumnBuilder::Utf8(Vec::new()),
        }
    }

    pub const fn datatype(&self) -> DataType {
        match self {
            ColumnBuilder::Boolean(_) => DataType::Boolean,
            ColumnBuilder::Int32(_) => DataType::Int32,
            ColumnBuilder::Int64(_) => DataType::Int64,
            ColumnBuilder::Float32(_) => DataType::Float32,
            ColumnBuilder::Float64(_) => DataType::Float64,
            ColumnBuilder::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuilder::Boolean(v) => v.len(),
            ColumnBuilder::Int32(v) => v.len(),
            ColumnBuilder::Int64(v) => v.len(),
            ColumnBuilder::Float32(v) => v.len(),
            ColumnBuilder::Float64(v) => v.len(),
            ColumnBuilder::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value, erroring on a type mismatch (no silent casts).
    pub fn push_value(&mut self, value: ScalarValue) -> Result<()> {
        match (self, value) {
            (ColumnBuilder::Boolean(col), ScalarValue::Boolean(v)) => col.push(v),
            (ColumnBuilder::Int32(col), ScalarValue::Int32(v)) => col.push(v),
            (ColumnBuilder::Int64(col), ScalarValue::Int64(v)) => col.push(v),
            (ColumnBuilder::Float32(col), ScalarValue::Float32(v)) => col.push(v),
            (ColumnBuilder::Float64(col), ScalarValue::Float64(v)) => col.push(v),
            (ColumnBuilder::Utf8(col), ScalarValue::Utf8(v)) => col.push(v),
            (builder, value) => {
                return Err(WeftError::invalid_argument(format!(
                    "Cannot append {} value to {} column",
                    value.datatype(),
                    builder.datatype()
                )))
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Column {
        match self {
            ColumnBuilder::Boolean(v) => Column::Boolean(v),
            ColumnBuilder::Int32(v) => Column::Int32(v),
            ColumnBuilder::Int64(v) => Column::Int64(v),
            ColumnBuilder::Float32(v) => Column::Float32(v),
            ColumnBuilder::Float64(v) => Column::Float64(v),
            ColumnBuilder::Utf8(v) => Column::Utf8(v),
        }
    }
}
