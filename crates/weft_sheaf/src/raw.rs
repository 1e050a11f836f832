use std::io::Read;

use serde::{Deserialize, Serialize};
use weft_error::{Result, WeftError};

use crate::batch::{TupleBatch, BATCH_SIZE};
use crate::buffer::TupleBatchBuffer;
use crate::datatype::DataType;
use crate::field::Schema;

/// Byte order of the fields in a raw tuple stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// Reader for a flat binary stream of fixed-width rows.
///
/// Each row is the schema's fields in order, every field encoded at its fixed
/// width in the configured byte order. Only fixed-width numeric types are
/// representable in this format.
///
/// End-of-input exactly at a row boundary is a clean end; running out of data
/// with a row partially consumed is a data error. The reader tracks how many
/// fields of the current row it has consumed rather than inferring truncation
/// from where a read failed.
#[derive(Debug)]
pub struct RawTupleReader<R: Read> {
    schema: Schema,
    order: ByteOrder,
    input: R,
    buffer: TupleBatchBuffer,
    exhausted: bool,
}

impl<R: Read> RawTupleReader<R> {
    pub fn try_new(schema: Schema, order: ByteOrder, input: R) -> Result<Self> {
        for field in schema.fields() {
            match field.datatype {
                DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64 => {}
                other => {
                    return Err(WeftError::unsupported(format!(
                        "Raw tuple streams only carry fixed-width numeric types, schema has {other}"
                    )))
                }
            }
        }

        Ok(RawTupleReader {
            buffer: TupleBatchBuffer::new(schema.clone()),
            schema,
            order,
            input,
            exhausted: false,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read up to [`BATCH_SIZE`] rows, returning `None` once the input is
    /// exhausted and all buffered rows have been handed out.
    pub fn read_batch(&mut self) -> Result<Option<TupleBatch>> {
        while !self.exhausted && self.buffer.num_tuples() < BATCH_SIZE {
            let mut fields_read = 0;
            let num_fields = self.schema.fields().len();
            for idx in 0..num_fields {
                let datatype = self.schema.fields()[idx].datatype;
                let width = datatype
                    .fixed_width()
                    .expect("validated at construction");
                let mut bytes = [0u8; 8];
                let got = fill(&mut self.input, &mut bytes[..width])?;

                if got == 0 && fields_read == 0 {
                    // Data ran out exactly at a row boundary.
                    self.exhausted = true;
                    break;
                }
                if got < width {
                    return Err(WeftError::data(
                        "Ran out of binary data in the middle of a row",
                    ));
                }

                self.put_field(idx, datatype, &bytes[..width])?;
                fields_read += 1;
            }
        }

        self.buffer.pop_any()
    }

    fn put_field(&mut self, column: usize, datatype: DataType, bytes: &[u8]) -> Result<()> {
        match (datatype, self.order) {
            (DataType::Int32, ByteOrder::BigEndian) => self
                .buffer
                .put_int32(column, i32::from_be_bytes(bytes.try_into().unwrap())),
            (DataType::Int32, ByteOrder::LittleEndian) => self
                .buffer
                .put_int32(column, i32::from_le_bytes(bytes.try_into().unwrap())),
            (DataType::Int64, ByteOrder::BigEndian) => self
                .buffer
                .put_int64(column, i64::from_be_bytes(bytes.try_into().unwrap())),
            (DataType::Int64, ByteOrder::LittleEndian) => self
                .buffer
                .put_int64(column, i64::from_le_bytes(bytes.try_into().unwrap())),
            (DataType::Float32, ByteOrder::BigEndian) => self
                .buffer
                .put_float32(column, f32::from_be_bytes(bytes.try_into().unwrap())),
            (DataType::Float32, ByteOrder::LittleEndian) => self
                .buffer
                .put_float32(column, f32::from_le_bytes(bytes.try_into().unwrap())),
            (DataType::Float64, ByteOrder::BigEndian) => self
                .buffer
                .put_float64(column, f64::from_be_bytes(bytes.try_into().unwrap())),
            (DataType::Float64, ByteOrder::LittleEndian) => self
                .buffer
                .put_float64(column, f64::from_le_bytes(bytes.try_into().unwrap())),
            (other, _) => Err(WeftError::unsupported(format!(
                "Raw tuple streams cannot carry {other}"
            ))),
        }
    }
}

/// Read until `buf` is full or the input is exhausted, returning bytes read.
fn fill(input: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = input.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
