use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{BoxedOperator, Operator, OperatorBase};

/// Pass-through operator that renames its child's columns.
///
/// Types, column order, and data are untouched; batches share their column
/// storage with the child's output. The name list is validated against the
/// child schema as soon as the child is attached — at construction, or at
/// `set_children` for the lazily-assembled form.
#[derive(Debug)]
pub struct Rename {
    base: OperatorBase,
    names: Vec<String>,
    schema: Option<Schema>,
}

impl Rename {
    pub fn try_new(child: BoxedOperator, names: Vec<String>) -> Result<Self> {
        let schema = child.schema().rename(names.iter().cloned())?;
        Ok(Rename {
            base: OperatorBase::unary(child),
            names,
            schema: Some(schema),
        })
    }

    /// A rename whose child is attached later via `set_children`.
    pub fn pending(names: Vec<String>) -> Self {
        Rename {
            base: OperatorBase::leaf(),
            names,
            schema: None,
        }
    }
}

impl Operator for Rename {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn schema(&self) -> &Schema {
        self.schema
            .as_ref()
            .expect("rename child must be attached before schema access")
    }

    fn fetch_next(&mut self) -> Result<Option<TupleBatch>> {
        let polled = self.base.child_mut(0)?.next()?;
        match polled {
            Some(batch) => Ok(Some(batch.rename(self.names.iter().cloned())?)),
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
            Some(batch) => Ok(Some(batch.rename(self.names.iter().cloned())?)),
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

    fn set_children(&mut self, children: Vec<BoxedOperator>) -> Result<()> {
        let child = match children.as_slice() {
            [child] => child,
            other => {
                return Err(WeftError::invalid_argument(format!(
                    "Rename takes exactly one child, got {}",
                    other.len()
                )))
            }
        };
        let schema = child.schema().rename(self.names.iter().cloned())?;
        self.schema = Some(schema);
        self.base.replace_children(children);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ExecEnv;
    use crate::operators::tuple_source::TupleSource;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    const TUPLES_TO_BUILD: usize = 100;

    fn original_batch() -> TupleBatch {
        let schema = Schema::new([
            Field::new("string", DataType::Utf8),
            Field::new("int", DataType::Int32),
        ]);
        let strings = Column::Utf8((0..TUPLES_TO_BUILD).map(|i| format!("val{i}")).collect());
        let ints = Column::Int32((0..TUPLES_TO_BUILD as i32).collect());
        TupleBatch::try_new(schema, [strings, ints]).unwrap()
    }

    fn two_batch_source() -> BoxedOperator {
        Box::new(TupleSource::try_new(vec![original_batch(), original_batch()]).unwrap())
    }

    fn verify_renamed(original: &TupleBatch, renamed: &TupleBatch, names: &[&str]) {
        assert_eq!(
            original.schema().datatypes().collect::<Vec<_>>(),
            renamed.schema().datatypes().collect::<Vec<_>>()
        );
        assert_eq!(names, renamed.schema().names().collect::<Vec<_>>().as_slice());
        assert_eq!(original.num_columns(), renamed.num_columns());
        assert_eq!(original.num_rows(), renamed.num_rows());
        for row in 0..renamed.num_rows() {
            for column in 0..renamed.num_columns() {
                assert_eq!(
                    original.value(column, row).unwrap(),
                    renamed.value(column, row).unwrap()
                );
            }
        }
    }

    #[test]
    fn rename_operator_two_sources() {
        let env = ExecEnv::default();
        let names = vec!["stringNew".to_string(), "intNew".to_string()];
        let mut rename = Rename::try_new(two_batch_source(), names).unwrap();
        let original = original_batch();

        rename.open(&env).unwrap();
        let mut total_rows = 0;
        while !rename.eos() {
            let Some(renamed) = rename.next_ready().unwrap() else {
                continue;
            };
            verify_renamed(&original, &renamed, &["stringNew", "intNew"]);
            total_rows += renamed.num_rows();
        }
        assert_eq!(2 * TUPLES_TO_BUILD, total_rows);
        rename.cleanup().unwrap();
    }

    #[test]
    fn rename_operator_too_many_columns() {
        let names = vec![
            "stringNew".to_string(),
            "intNew".to_string(),
            "extraColumn".to_string(),
        ];
        Rename::try_new(two_batch_source(), names).expect_err("three names for two columns");
    }

    #[test]
    fn rename_operator_too_few_columns() {
        let names = vec!["onlyOneColumn".to_string()];
        Rename::try_new(two_batch_source(), names).expect_err("one name for two columns");
    }

    #[test]
    fn rename_operator_delayed_child() {
        let env = ExecEnv::default();
        let names = vec!["stringNew".to_string(), "intNew".to_string()];
        let mut rename = Rename::pending(names);
        rename.set_children(vec![two_batch_source()]).unwrap();
        let original = original_batch();

        rename.open(&env).unwrap();
        let mut total_rows = 0;
        while !rename.eos() {
            let Some(renamed) = rename.next_ready().unwrap() else {
                continue;
            };
            verify_renamed(&original, &renamed, &["stringNew", "intNew"]);
            total_rows += renamed.num_rows();
        }
        assert_eq!(2 * TUPLES_TO_BUILD, total_rows);
    }

    #[test]
    fn rename_operator_delayed_child_wrong_arity() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut rename = Rename::pending(names);
        rename
            .set_children(vec![two_batch_source()])
            .expect_err("three names for a two-column child");
    }

    #[test]
    fn rename_operator_blocking_pull() {
        let env = ExecEnv::default();
        let names = vec!["fullName".to_string(), "ageYears".to_string()];
        let mut rename = Rename::try_new(two_batch_source(), names).unwrap();

        rename.open(&env).unwrap();
        let mut total_rows = 0;
        while let Some(batch) = rename.next().unwrap() {
            total_rows += batch.num_rows();
        }
        assert!(rename.eos());
        assert_eq!(2 * TUPLES_TO_BUILD, total_rows);
    }
}
