use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_error::Result;
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{BoxedOperator, Operator, OperatorBase};
use crate::env::ExecEnv;

/// Destination for the batches a [`RootOperator`] drains from its child.
///
/// Concrete sinks route batches to the network exchange, to storage, or into
/// an in-process collection. A sink must not retain the batch reference
/// beyond the `consume` call; anything kept must be copied (batch clones are
/// cheap, columns are shared).
pub trait BatchSink: Debug + Send {
    /// Runtime setup. Receives the child's output schema.
    fn init(&mut self, _env: &ExecEnv, _child_schema: &Schema) -> Result<()> {
        Ok(())
    }

    /// Called once per batch pulled from the child.
    fn consume(&mut self, batch: &TupleBatch) -> Result<()>;

    /// The child reached end of stream; flush anything buffered.
    fn child_eos(&mut self) -> Result<()> {
        Ok(())
    }

    /// The child reached end of iteration; the plan may restart a round.
    fn child_eoi(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reset round-local state after EOI.
    fn rewind(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release runtime resources. Must be safe to call after a failure and
    /// must release everything it reserved exactly once.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Terminal operator driving a subtree into a sink.
///
/// Pulls from its single child, feeding each batch to the sink until the
/// child signals EOS or EOI. Produces no batches of its own.
#[derive(Debug)]
pub struct RootOperator<S: BatchSink> {
    base: OperatorBase,
    sink: S,
}

impl<S: BatchSink> RootOperator<S> {
    pub fn new(child: BoxedOperator, sink: S) -> Self {
        RootOperator {
            base: OperatorBase::unary(child),
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Handle the child's terminal state, notifying the sink exactly once.
    fn on_child_terminal(&mut self) -> Result<()> {
        let child_eoi = self.base.children()[0].eoi();
        if child_eoi {
            self.sink.child_eoi()?;
            self.base.set_eoi();
        } else {
            self.sink.child_eos()?;
        }
        Ok(())
    }
}

impl<S: BatchSink> Operator for RootOperator<S> {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OperatorBase {
        &mut self.base
    }

    fn schema(&self) -> &Schema {
        self.base.children()[0].schema()
    }

    fn init(&mut self, env: &ExecEnv) -> Result<()> {
        let schema = self.base.children()[0].schema().clone();
        self.sink.init(env, &schema)
    }

    fn fetch_next(&mut self) -> Result<Option<TupleBatch>> {
        loop {
            let polled = self.base.child_mut(0)?.next()?;
            match polled {
                Some(batch) => self.sink.consume(&batch)?,
                None => {
                    self.on_child_terminal()?;
                    return Ok(None);
                }
            }
        }
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        let polled = self.base.child_mut(0)?.next_ready()?;
        match polled {
            Some(batch) => {
                self.sink.consume(&batch)?;
            }
            None => {
                let child = &self.base.children()[0];
                if child.eos() {
                    self.sink.child_eos()?;
                    self.base.set_eos();
                } else if child.eoi() {
                    self.sink.child_eoi()?;
                    self.base.set_eoi();
                }
            }
        }
        Ok(None)
    }

    fn rewind_inner(&mut self, _env: &ExecEnv) -> Result<()> {
        self.sink.rewind()
    }

    fn cleanup_inner(&mut self) -> Result<()> {
        self.sink.cleanup()
    }
}

/// Shared view of the batches a [`BatchCollector`] received.
#[derive(Debug, Clone, Default)]
pub struct CollectedBatches {
    batches: Arc<Mutex<Vec<TupleBatch>>>,
}

impl CollectedBatches {
    pub fn batches(&self) -> Vec<TupleBatch> {
        self.batches.lock().clone()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.lock().iter().map(|b| b.num_rows()).sum()
    }
}

/// Sink collecting result batches in process, for local queries and tests.
#[derive(Debug, Default)]
pub struct BatchCollector {
    collected: CollectedBatches,
}

impl BatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> CollectedBatches {
        self.collected.clone()
    }
}

impl BatchSink for BatchCollector {
    fn consume(&mut self, batch: &TupleBatch) -> Result<()> {
        self.collected.batches.lock().push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::tuple_source::TupleSource;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    fn source(batches: usize) -> BoxedOperator {
        let schema = Schema::new([Field::new("x", DataType::Int32)]);
        let batches = (0..batches)
            .map(|i| {
                TupleBatch::try_new(
                    schema.clone(),
                    [Column::Int32(vec![i as i32, i as i32 + 1])],
                )
                .unwrap()
            })
            .collect();
        Box::new(TupleSource::try_new(batches).unwrap())
    }

    #[test]
    fn drains_child_into_sink() {
        let env = ExecEnv::default();
        let collector = BatchCollector::new();
        let handle = collector.handle();
        let mut root = RootOperator::new(source(3), collector);

        root.open(&env).unwrap();
        assert!(root.next().unwrap().is_none());
        assert!(root.eos());
        assert_eq!(3, handle.batches().len());
        assert_eq!(6, handle.num_rows());
        root.cleanup().unwrap();
    }

    #[test]
    fn non_blocking_drive() {
        let env = ExecEnv::default();
        let collector = BatchCollector::new();
        let handle = collector.handle();
        let mut root = RootOperator::new(source(2), collector);

        root.open(&env).unwrap();
        while !root.eos() {
            assert!(root.next_ready().unwrap().is_none());
        }
        assert_eq!(2, handle.batches().len());
    }
}
