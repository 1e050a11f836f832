//! Columnar tuple batch data model.
//!
//! A "sheaf" is a bundle of same-length columns. Batches flowing between
//! operators are immutable sheaves bounded by [`batch::BATCH_SIZE`] rows;
//! the mutable counterpart is [`buffer::TupleBatchBuffer`].

pub mod batch;
pub mod buffer;
pub mod column;
pub mod datatype;
pub mod field;
pub mod raw;
pub mod scalar;
