use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use weft_error::{Result, ResultExt, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;
use weft_sheaf::raw::{ByteOrder, RawTupleReader};

use super::{Operator, OperatorBase};
use crate::env::ExecEnv;

/// Where the scan finds its input file.
#[derive(Debug, Clone)]
enum ScanSource {
    /// A path fixed at plan-compile time.
    Path(PathBuf),
    /// A key looked up in the execution environment at init, so the same
    /// plan can point at per-worker files.
    EnvParam(String),
}

/// Leaf scan over a flat binary file of fixed-width rows.
#[derive(Debug)]
pub struct RawFileScan {
    base: OperatorBase,
    schema: Schema,
    order: ByteOrder,
    source: ScanSource,
    reader: Option<RawTupleReader<BufReader<File>>>,
}

impl RawFileScan {
    pub fn try_new(schema: Schema, order: ByteOrder, path: impl Into<PathBuf>) -> Result<Self> {
        Self::build(schema, order, ScanSource::Path(path.into()))
    }

    /// Resolve the file path from an environment parameter at init.
    pub fn from_env_param(
        schema: Schema,
        order: ByteOrder,
        param: impl Into<String>,
    ) -> Result<Self> {
        Self::build(schema, order, ScanSource::EnvParam(param.into()))
    }

    fn build(schema: Schema, order: ByteOrder, source: ScanSource) -> Result<Self> {
        // Reject variable-width schemas up front rather than at init.
        RawTupleReader::try_new(schema.clone(), order, std::io::empty())?;
        Ok(RawFileScan {
            base: OperatorBase::leaf(),
            schema,
            order,
            source,
            reader: None,
        })
    }
}

impl Operator for RawFileScan {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self, env: &ExecEnv) -> Result<()> {
        let path = match &self.source {
            ScanSource::Path(path) => path.clone(),
            ScanSource::EnvParam(key) => PathBuf::from(env.param(key)?),
        };
        let file = File::open(&path).context("Failed to open raw tuple file")?;
        self.reader = Some(RawTupleReader::try_new(
            self.schema.clone(),
            self.order,
            BufReader::new(file),
        )?);
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<TupleBatch>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| WeftError::illegal_state("RawFileScan pulled before init"))?;
        reader.read_batch()
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        // Local file reads complete immediately; exhaustion is the only
        // "not ready" condition and it's terminal.
        let batch = self.fetch_next()?;
        if batch.is_none() {
            self.base.set_eos();
        }
        Ok(batch)
    }

    fn cleanup_inner(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
