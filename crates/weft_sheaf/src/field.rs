use serde::{Deserialize, Serialize};
use weft_error::{Result, WeftError};

use crate::datatype::DataType;

/// A named column in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            name: name.into(),
            datatype,
        }
    }
}

/// Ordered list of fields describing the columns of a batch.
///
/// Column count and order are authoritative for all positional access. Names
/// need not be unique. Immutable once constructed; operators that share an
/// output schema share it by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
        }
    }

    pub const fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn datatypes(&self) -> impl Iterator<Item = DataType> + '_ {
        self.fields.iter().map(|f| f.datatype)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Produce a schema with the same types and order but new names.
    ///
    /// Errors if the number of names doesn't match the number of columns.
    pub fn rename(&self, names: impl IntoIterator<Item = String>) -> Result<Schema> {
        let names: Vec<_> = names.into_iter().collect();
        if names.len() != self.fields.len() {
            return Err(WeftError::invalid_argument(format!(
                "Expected {} names for rename, got {}",
                self.fields.len(),
                names.len()
            )));
        }

        Ok(Schema {
            fields: names
                .into_iter()
                .zip(self.fields.iter())
                .map(|(name, field)| Field::new(name, field.datatype))
                .collect(),
        })
    }

    /// Select a subset/reordering of fields by index.
    pub fn project(&self, indices: &[usize]) -> Result<Schema> {
        let mut fields = Vec::with_capacity(indices.len());
        for &idx in indices {
            let field = self.fields.get(idx).ok_or_else(|| {
                WeftError::invalid_argument(format!(
                    "Projection index {idx} out of range for schema with {} columns",
                    self.fields.len()
                ))
            })?;
            fields.push(field.clone());
        }
        Ok(Schema { fields })
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Schema::new(iter)
    }
}
