use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use super::{Operator, OperatorBase};
use crate::env::ExecEnv;
use crate::exchange::pool::{Delivery, ExchangeInbox};
use crate::exchange::{ExchangePairId, Frame, WorkerId};
use crate::fragment::CancelToken;

/// Source operator receiving one logical exchange channel.
///
/// The remote counterpart of a producer channel: frames arrive in the
/// worker's inbox tagged with the shared [`ExchangePairId`]; this operator
/// reassembles them into a batch stream. Per-sender sequence numbers are
/// checked — a gap or repeat is a data error, not silent reordering. EOS is
/// reached once every expected sender has sent its stream-end marker; a
/// round of iter-end markers from every sender yields EOI instead, which a
/// rewind clears.
#[derive(Debug)]
pub struct Consumer {
    base: OperatorBase,
    schema: Schema,
    channel: ExchangePairId,
    sources: Vec<WorkerId>,
    runtime: Option<ConsumerRuntime>,
}

/// Runtime half of a consumer, attached at init and dropped at cleanup.
#[derive(Debug)]
struct ConsumerRuntime {
    inbox: Arc<ExchangeInbox>,
    cancel: CancelToken,
    /// Expected next sequence number per sending worker.
    next_seq: HashMap<WorkerId, u64>,
    /// Senders that sent their stream-end marker.
    ended: HashSet<WorkerId>,
    /// Senders that sent an iter-end marker this round.
    iter_ended: HashSet<WorkerId>,
}

impl Consumer {
    pub fn try_new(
        schema: Schema,
        channel: ExchangePairId,
        sources: Vec<WorkerId>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(WeftError::invalid_argument(
                "Consumer requires at least one source worker",
            ));
        }
        Ok(Consumer {
            base: OperatorBase::leaf(),
            schema,
            channel,
            sources,
            runtime: None,
        })
    }

    fn process(&mut self, delivery: Delivery) -> Result<Option<TupleBatch>> {
        let Delivery { from, frame } = delivery;
        let num_sources = self.sources.len();
        let rt = self
            .runtime
            .as_mut()
            .ok_or_else(|| WeftError::illegal_state("Consumer pulled before init"))?;
        match frame {
            Frame::StreamBegin { .. } => {
                debug!(channel = %self.channel, %from, "consumer saw channel handshake");
                Ok(None)
            }
            Frame::Data { seq, batch, .. } => {
                let expected = rt.next_seq.entry(from).or_insert(0);
                if seq != *expected {
                    return Err(WeftError::data(format!(
                        "Out-of-order data on {} from {from}: expected seq {expected}, got {seq}",
                        self.channel
                    )));
                }
                *expected += 1;

                if batch.schema().datatypes().collect::<Vec<_>>()
                    != self.schema.datatypes().collect::<Vec<_>>()
                {
                    return Err(WeftError::data(format!(
                        "Batch on {} does not match the consumer schema",
                        self.channel
                    )));
                }
                // Present the consumer's own column names downstream.
                Ok(Some(batch.rename(self.schema.names().map(String::from))?))
            }
            Frame::IterEnd { .. } => {
                rt.iter_ended.insert(from);
                if rt.iter_ended.len() == num_sources {
                    self.base.set_eoi();
                }
                Ok(None)
            }
            Frame::StreamEnd { .. } => {
                rt.ended.insert(from);
                if rt.ended.len() == num_sources {
                    self.base.set_eos();
                }
                Ok(None)
            }
        }
    }

    fn require_runtime(&self) -> Result<(Arc<ExchangeInbox>, CancelToken)> {
        let rt = self
            .runtime
            .as_ref()
            .ok_or_else(|| WeftError::illegal_state("Consumer pulled before init"))?;
        Ok((rt.inbox.clone(), rt.cancel.clone()))
    }
}

impl Operator for Consumer {
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
        self.runtime = Some(ConsumerRuntime {
            inbox: env.exchange_inbox()?,
            cancel: env.cancel_token().clone(),
            next_seq: HashMap::new(),
            ended: HashSet::new(),
            iter_ended: HashSet::new(),
        });
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<TupleBatch>> {
        let (inbox, cancel) = self.require_runtime()?;
        loop {
            let delivery = inbox.recv(self.channel, &cancel)?;
            if let Some(batch) = self.process(delivery)? {
                return Ok(Some(batch));
            }
            if self.base.eos() || self.base.eoi() {
                return Ok(None);
            }
        }
    }

    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>> {
        let (inbox, _) = self.require_runtime()?;
        loop {
            let Some(delivery) = inbox.try_recv(self.channel) else {
                return Ok(None);
            };
            if let Some(batch) = self.process(delivery)? {
                return Ok(Some(batch));
            }
            if self.base.eos() || self.base.eoi() {
                return Ok(None);
            }
        }
    }

    fn rewind_inner(&mut self, _env: &ExecEnv) -> Result<()> {
        if let Some(rt) = &mut self.runtime {
            rt.iter_ended.clear();
        }
        Ok(())
    }

    fn cleanup_inner(&mut self) -> Result<()> {
        if let Some(rt) = self.runtime.take() {
            rt.inbox.remove_channel(self.channel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::pool::LoopbackExchange;
    use weft_error::ErrorKind;
    use weft_sheaf::column::Column;
    use weft_sheaf::datatype::DataType;
    use weft_sheaf::field::Field;

    fn schema() -> Schema {
        Schema::new([Field::new("x", DataType::Int32)])
    }

    fn data_frame(channel: ExchangePairId, seq: u64, vals: Vec<i32>) -> Frame {
        Frame::Data {
            channel,
            seq,
            batch: TupleBatch::try_new(schema(), [Column::Int32(vals)]).unwrap(),
        }
    }

    fn consumer_env(exchange: &Arc<LoopbackExchange>, own: WorkerId) -> ExecEnv {
        ExecEnv::builder()
            .worker_id(own)
            .exchange_inbox(exchange.inbox(own))
            .build()
    }

    #[test]
    fn reassembles_stream_from_two_senders() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(1);
        let env = consumer_env(&exchange, own);
        let channel = ExchangePairId::new_unique();
        let inbox = exchange.inbox(own);

        let mut consumer = Consumer::try_new(
            schema(),
            channel,
            vec![WorkerId::new(2), WorkerId::new(3)],
        )
        .unwrap();
        consumer.open(&env).unwrap();

        inbox.deposit(WorkerId::new(2), Frame::StreamBegin { channel });
        inbox.deposit(WorkerId::new(2), data_frame(channel, 0, vec![1, 2]));
        inbox.deposit(WorkerId::new(3), data_frame(channel, 0, vec![3]));
        inbox.deposit(WorkerId::new(2), Frame::StreamEnd { channel });

        let mut rows = Vec::new();
        while let Some(batch) = consumer.next_ready().unwrap() {
            rows.extend_from_slice(batch.column(0).unwrap().try_int32().unwrap());
        }
        assert_eq!(vec![1, 2, 3], rows);
        assert!(!consumer.eos(), "one sender still open");

        inbox.deposit(WorkerId::new(3), Frame::StreamEnd { channel });
        assert!(consumer.next_ready().unwrap().is_none());
        assert!(consumer.eos());
        consumer.cleanup().unwrap();
    }

    #[test]
    fn sequence_gap_is_a_data_error() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(1);
        let env = consumer_env(&exchange, own);
        let channel = ExchangePairId::new_unique();
        let inbox = exchange.inbox(own);

        let mut consumer =
            Consumer::try_new(schema(), channel, vec![WorkerId::new(2)]).unwrap();
        consumer.open(&env).unwrap();

        inbox.deposit(WorkerId::new(2), data_frame(channel, 0, vec![1]));
        inbox.deposit(WorkerId::new(2), data_frame(channel, 2, vec![2]));

        assert!(consumer.next_ready().unwrap().is_some());
        let err = consumer.next_ready().unwrap_err();
        assert_eq!(ErrorKind::Data, err.kind());
    }

    #[test]
    fn duplicate_frame_is_a_data_error() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(1);
        let env = consumer_env(&exchange, own);
        let channel = ExchangePairId::new_unique();
        let inbox = exchange.inbox(own);

        let mut consumer =
            Consumer::try_new(schema(), channel, vec![WorkerId::new(2)]).unwrap();
        consumer.open(&env).unwrap();

        inbox.deposit(WorkerId::new(2), data_frame(channel, 0, vec![1]));
        inbox.deposit(WorkerId::new(2), data_frame(channel, 0, vec![1]));

        assert!(consumer.next_ready().unwrap().is_some());
        assert_eq!(
            ErrorKind::Data,
            consumer.next_ready().unwrap_err().kind()
        );
    }

    #[test]
    fn iter_end_round_yields_eoi_and_rewinds() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(1);
        let env = consumer_env(&exchange, own);
        let channel = ExchangePairId::new_unique();
        let inbox = exchange.inbox(own);

        let mut consumer =
            Consumer::try_new(schema(), channel, vec![WorkerId::new(2)]).unwrap();
        consumer.open(&env).unwrap();

        inbox.deposit(WorkerId::new(2), data_frame(channel, 0, vec![1]));
        inbox.deposit(WorkerId::new(2), Frame::IterEnd { channel });

        assert!(consumer.next_ready().unwrap().is_some());
        assert!(consumer.next_ready().unwrap().is_none());
        assert!(consumer.eoi());
        assert!(!consumer.eos());

        consumer.rewind(&env).unwrap();
        assert!(!consumer.eoi());

        // Next round continues the per-sender sequence.
        inbox.deposit(WorkerId::new(2), data_frame(channel, 1, vec![2]));
        inbox.deposit(WorkerId::new(2), Frame::StreamEnd { channel });
        let batch = consumer.next_ready().unwrap().expect("second round data");
        assert_eq!(&[2], batch.column(0).unwrap().try_int32().unwrap());
        assert!(consumer.next_ready().unwrap().is_none());
        assert!(consumer.eos());
    }

    #[test]
    fn blocking_pull_sees_deposited_frames() {
        let exchange = LoopbackExchange::new();
        let own = WorkerId::new(1);
        let env = consumer_env(&exchange, own);
        let channel = ExchangePairId::new_unique();
        let inbox = exchange.inbox(own);

        let mut consumer =
            Consumer::try_new(schema(), channel, vec![WorkerId::new(2)]).unwrap();
        consumer.open(&env).unwrap();

        let inbox_clone = inbox.clone();
        let writer = std::thread::spawn(move || {
            inbox_clone.deposit(WorkerId::new(2), data_frame(channel, 0, vec![5]));
            inbox_clone.deposit(WorkerId::new(2), Frame::StreamEnd { channel });
        });

        let batch = consumer.next().unwrap().expect("blocking pull gets data");
        assert_eq!(&[5], batch.column(0).unwrap().try_int32().unwrap());
        assert!(consumer.next().unwrap().is_none());
        assert!(consumer.eos());
        writer.join().unwrap();
    }
}
