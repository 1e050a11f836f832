//! Incremental per-type aggregators.
//!
//! An aggregator is constructed with a target field name and the set of
//! operations to compute simultaneously. The requested set is validated
//! against the type's available operations at construction (fail fast on an
//! empty or unsupported set). The result schema is derived once from the
//! requested set and results are written into a batch buffer at a caller
//! supplied column offset, in the fixed order count, min, max, sum, avg
//! (restricted to the requested operations).
//!
//! All `add` forms — scalar, column, `(batch, column)`, `(batch, column,
//! row)` — leave the aggregator in the same state as adding the same values
//! one at a time. A missing (`None`) scalar contributes to nothing, not even
//! the count.

pub mod boolean;
pub mod numeric;
pub mod string;

use std::fmt;

use serde::{Deserialize, Serialize};
use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::column::Column;
use weft_sheaf::datatype::DataType;
use weft_sheaf::field::Schema;
use weft_sheaf::scalar::ScalarValue;

use self::boolean::BooleanAggregator;
use self::numeric::NumericAggregator;
use self::string::StringAggregator;

/// A single aggregate operation. Variant order is the result column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateOp {
    pub const ALL: [AggregateOp; 5] = [
        AggregateOp::Count,
        AggregateOp::Min,
        AggregateOp::Max,
        AggregateOp::Sum,
        AggregateOp::Avg,
    ];

    /// Prefix used for result column names, e.g. `count_age`.
    pub const fn prefix(self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            AggregateOp::Count => 1 << 0,
            AggregateOp::Min => 1 << 1,
            AggregateOp::Max => 1 << 2,
            AggregateOp::Sum => 1 << 3,
            AggregateOp::Avg => 1 << 4,
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// A set of aggregate operations with a defined iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateOps(u8);

impl AggregateOps {
    pub const fn empty() -> Self {
        AggregateOps(0)
    }

    pub fn of(ops: &[AggregateOp]) -> Self {
        ops.iter().copied().collect()
    }

    #[must_use]
    pub const fn with(self, op: AggregateOp) -> Self {
        AggregateOps(self.0 | op.bit())
    }

    pub const fn contains(self, op: AggregateOp) -> bool {
        self.0 & op.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn is_subset_of(self, other: AggregateOps) -> bool {
        self.0 | other.0 == other.0
    }

    /// Iterate requested operations in the canonical result order.
    pub fn iter(self) -> impl Iterator<Item = AggregateOp> {
        AggregateOp::ALL.into_iter().filter(move |op| self.contains(*op))
    }

    /// The operations available for a value type.
    pub fn available_for(datatype: DataType) -> AggregateOps {
        match datatype {
            DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 => {
                AggregateOps::of(&AggregateOp::ALL)
            }
            DataType::Utf8 | DataType::Boolean => {
                AggregateOps::of(&[AggregateOp::Count, AggregateOp::Min, AggregateOp::Max])
            }
        }
    }

    /// Fail fast if the set is empty or requests anything the type cannot do.
    pub fn validate_for(self, datatype: DataType) -> Result<()> {
        if self.is_empty() {
            return Err(WeftError::unsupported(
                "No aggregation operations are selected",
            ));
        }
        let available = Self::available_for(datatype);
        if !self.is_subset_of(available) {
            return Err(WeftError::unsupported(format!(
                "Unsupported aggregation on {datatype} column; available: {available}"
            )));
        }
        Ok(())
    }
}

impl FromIterator<AggregateOp> for AggregateOps {
    fn from_iter<T: IntoIterator<Item = AggregateOp>>(iter: T) -> Self {
        iter.into_iter()
            .fold(AggregateOps::empty(), AggregateOps::with)
    }
}

impl fmt::Display for AggregateOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for op in self.iter() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{op}")?;
            first = false;
        }
        Ok(())
    }
}

/// Per-type aggregator behind a single dispatch surface.
#[derive(Debug)]
pub enum Aggregator {
    Int32(NumericAggregator<i32>),
    Int64(NumericAggregator<i64>),
    Float32(NumericAggregator<f32>),
    Float64(NumericAggregator<f64>),
    Utf8(StringAggregator),
    Boolean(BooleanAggregator),
}

impl Aggregator {
    /// Build an aggregator for a field of the given type.
    ///
    /// Fails fast if `ops` is empty or not available for the type.
    pub fn try_new(field: &str, datatype: DataType, ops: AggregateOps) -> Result<Self> {
        Ok(match datatype {
            DataType::Int32 => Aggregator::Int32(NumericAggregator::try_new(field, ops)?),
            DataType::Int64 => Aggregator::Int64(NumericAggregator::try_new(field, ops)?),
            DataType::Float32 => Aggregator::Float32(NumericAggregator::try_new(field, ops)?),
            DataType::Float64 => Aggregator::Float64(NumericAggregator::try_new(field, ops)?),
            DataType::Utf8 => Aggregator::Utf8(StringAggregator::try_new(field, ops)?),
            DataType::Boolean => Aggregator::Boolean(BooleanAggregator::try_new(field, ops)?),
        })
    }

    pub fn result_schema(&self) -> &Schema {
        match self {
            Aggregator::Int32(agg) => agg.result_schema(),
            Aggregator::Int64(agg) => agg.result_schema(),
            Aggregator::Float32(agg) => agg.result_schema(),
            Aggregator::Float64(agg) => agg.result_schema(),
            Aggregator::Utf8(agg) => agg.result_schema(),
            Aggregator::Boolean(agg) => agg.result_schema(),
        }
    }

    pub fn ops(&self) -> AggregateOps {
        match self {
            Aggregator::Int32(agg) => agg.ops(),
            Aggregator::Int64(agg) => agg.ops(),
            Aggregator::Float32(agg) => agg.ops(),
            Aggregator::Float64(agg) => agg.ops(),
            Aggregator::Utf8(agg) => agg.ops(),
            Aggregator::Boolean(agg) => agg.ops(),
        }
    }

    /// Add a single value. `None` is a missing value and is skipped
    /// entirely — it updates no statistic, not even the count.
    pub fn add_scalar(&mut self, value: Option<&ScalarValue>) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        match self {
            Aggregator::Int32(agg) => agg.add_scalar(value),
            Aggregator::Int64(agg) => agg.add_scalar(value),
            Aggregator::Float32(agg) => agg.add_scalar(value),
            Aggregator::Float64(agg) => agg.add_scalar(value),
            Aggregator::Utf8(agg) => agg.add_scalar(value),
            Aggregator::Boolean(agg) => agg.add_scalar(value),
        }
    }

    /// Add every value in a column.
    pub fn add_column(&mut self, column: &Column) -> Result<()> {
        match self {
            Aggregator::Int32(agg) => agg.add_column(column),
            Aggregator::Int64(agg) => agg.add_column(column),
            Aggregator::Float32(agg) => agg.add_column(column),
            Aggregator::Float64(agg) => agg.add_column(column),
            Aggregator::Utf8(agg) => agg.add_column(column),
            Aggregator::Boolean(agg) => agg.add_column(column),
        }
    }

    /// Add every value in one column of a batch.
    pub fn add_batch_column(&mut self, batch: &TupleBatch, column: usize) -> Result<()> {
        let col = batch.column(column).ok_or_else(|| {
            WeftError::invalid_argument(format!(
                "Column {column} out of range for batch with {} columns",
                batch.num_columns()
            ))
        })?;
        self.add_column(col)
    }

    /// Add a single cell of a batch.
    pub fn add_batch_value(&mut self, batch: &TupleBatch, column: usize, row: usize) -> Result<()> {
        let value = batch.value(column, row)?;
        self.add_scalar(Some(&value))
    }

    /// Write the result columns into `buffer` starting at column `offset`.
    ///
    /// Exactly `ops().len()` columns are written, in the canonical order.
    pub fn get_result(&self, buffer: &mut TupleBatchBuffer, offset: usize) -> Result<()> {
        match self {
            Aggregator::Int32(agg) => agg.get_result(buffer, offset),
            Aggregator::Int64(agg) => agg.get_result(buffer, offset),
            Aggregator::Float32(agg) => agg.get_result(buffer, offset),
            Aggregator::Float64(agg) => agg.get_result(buffer, offset),
            Aggregator::Utf8(agg) => agg.get_result(buffer, offset),
            Aggregator::Boolean(agg) => agg.get_result(buffer, offset),
        }
    }
}
