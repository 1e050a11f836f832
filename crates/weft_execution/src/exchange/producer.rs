use std::fmt::Debug;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use ahash::RandomState;
use tracing::{debug, warn};
use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::buffer::TupleBatchBuffer;
use weft_sheaf::column::Column;
use weft_sheaf::field::Schema;

use super::pool::{Connection, ConnectionPool};
use super::topology::ExchangeTopology;
use super::{ExchangePairId, Frame, WorkerId};
use crate::env::ExecEnv;
use crate::operators::root::BatchSink;

/// Hash state shared by every shuffle in the process, so all producers of a
/// plan agree on row placement.
const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// Where a routing policy wants a batch's rows to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Every row to every channel.
    AllChannels,
    /// The whole batch to one channel.
    Single(usize),
    /// One destination channel per row; must cover every row.
    PerRow(Vec<usize>),
}

/// Row-placement policy injected into a [`Producer`].
///
/// The base producer is agnostic to the policy; it only guarantees channel
/// bookkeeping and sequencing.
pub trait RoutingPolicy: Debug + Send {
    /// Check the policy against the channel count at construction.
    fn validate(&self, _num_channels: usize) -> Result<()> {
        Ok(())
    }

    fn route(&self, batch: &TupleBatch, num_channels: usize) -> Result<Routing>;
}

/// Every row to every channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast;

impl RoutingPolicy for Broadcast {
    fn route(&self, _batch: &TupleBatch, _num_channels: usize) -> Result<Routing> {
        Ok(Routing::AllChannels)
    }
}

/// All rows to the producer's single channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collect;

impl RoutingPolicy for Collect {
    fn validate(&self, num_channels: usize) -> Result<()> {
        if num_channels != 1 {
            return Err(WeftError::invalid_argument(format!(
                "Collect requires exactly one channel, topology has {num_channels}"
            )));
        }
        Ok(())
    }

    fn route(&self, _batch: &TupleBatch, _num_channels: usize) -> Result<Routing> {
        Ok(Routing::Single(0))
    }
}

/// Shuffle: each row to exactly one channel, by the hash of its key columns.
#[derive(Debug, Clone)]
pub struct HashPartition {
    key_columns: Vec<usize>,
}

impl HashPartition {
    pub fn try_new(key_columns: Vec<usize>) -> Result<Self> {
        if key_columns.is_empty() {
            return Err(WeftError::invalid_argument(
                "HashPartition requires at least one key column",
            ));
        }
        Ok(HashPartition { key_columns })
    }
}

impl RoutingPolicy for HashPartition {
    fn route(&self, batch: &TupleBatch, num_channels: usize) -> Result<Routing> {
        let mut assignments = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let mut hasher = HASH_RANDOM_STATE.build_hasher();
            for &col in &self.key_columns {
                let column = batch.column(col).ok_or_else(|| {
                    WeftError::invalid_argument(format!(
                        "Key column {col} out of range for batch with {} columns",
                        batch.num_columns()
                    ))
                })?;
                hash_cell(column, row, &mut hasher);
            }
            assignments.push((hasher.finish() % num_channels as u64) as usize);
        }
        Ok(Routing::PerRow(assignments))
    }
}

fn hash_cell(column: &Column, row: usize, hasher: &mut impl Hasher) {
    match column {
        Column::Boolean(vals) => hasher.write_u8(vals[row] as u8),
        Column::Int32(vals) => hasher.write_i32(vals[row]),
        Column::Int64(vals) => hasher.write_i64(vals[row]),
        Column::Float32(vals) => hasher.write_u32(vals[row].to_bits()),
        Column::Float64(vals) => hasher.write_u64(vals[row].to_bits()),
        Column::Utf8(vals) => {
            hasher.write(vals[row].as_bytes());
            // Length terminator keeps adjacent strings from colliding.
            hasher.write_u8(0xff);
        }
    }
}

/// One logical output channel with its runtime state.
#[derive(Debug)]
struct ProducerChannel {
    id: ExchangePairId,
    destination: WorkerId,
    conn: Box<dyn Connection>,
    /// Sequence number of the next data frame on this channel.
    seq: u64,
    buffer: TupleBatchBuffer,
}

/// Runtime half of a producer: reserved connections and per-channel buffers.
///
/// Exists only between sink init and cleanup, keeping channel handles and
/// pool references out of the plan-definition state entirely.
#[derive(Debug)]
struct ProducerRuntime {
    pool: Arc<dyn ConnectionPool>,
    channels: Vec<ProducerChannel>,
}

impl ProducerRuntime {
    fn send_data(&mut self, idx: usize, batch: TupleBatch) -> Result<()> {
        let channel = &mut self.channels[idx];
        channel.conn.send(Frame::Data {
            channel: channel.id,
            seq: channel.seq,
            batch,
        })?;
        channel.seq += 1;
        Ok(())
    }

    fn flush_filled(&mut self, idx: usize) -> Result<()> {
        while let Some(batch) = self.channels[idx].buffer.pop_filled() {
            self.send_data(idx, batch)?;
        }
        Ok(())
    }

    /// Flush remaining partial batches and write a terminal marker to every
    /// channel.
    fn flush_all_and_mark(&mut self, marker: fn(ExchangePairId) -> Frame) -> Result<()> {
        for idx in 0..self.channels.len() {
            self.flush_filled(idx)?;
            if let Some(partial) = self.channels[idx].buffer.pop_any()? {
                self.send_data(idx, partial)?;
            }
            let channel = &mut self.channels[idx];
            channel.conn.send(marker(channel.id))?;
        }
        Ok(())
    }
}

/// Sink forwarding consumed batches to the channels of an exchange topology.
///
/// For every channel, `init` reserves a long-lived connection from the pool,
/// sends the channel-open handshake, and starts the sequence counter at 0.
/// Consumed rows land in per-channel buffers; each completed batch is
/// flushed tagged with the channel's current sequence number. On child EOS
/// the partial buffers are flushed and a stream-end marker is written before
/// cleanup releases every reserved connection exactly once.
#[derive(Debug)]
pub struct Producer {
    topology: ExchangeTopology,
    policy: Box<dyn RoutingPolicy>,
    runtime: Option<ProducerRuntime>,
}

impl Producer {
    pub fn try_new(topology: ExchangeTopology, policy: Box<dyn RoutingPolicy>) -> Result<Self> {
        policy.validate(topology.num_channels())?;
        Ok(Producer {
            topology,
            policy,
            runtime: None,
        })
    }

    /// Broadcast producer over the given topology.
    pub fn broadcast(topology: ExchangeTopology) -> Result<Self> {
        Self::try_new(topology, Box::new(Broadcast))
    }

    /// Collect producer: one channel to one destination.
    pub fn collect(id: ExchangePairId, worker: WorkerId) -> Result<Self> {
        Self::try_new(ExchangeTopology::collect(id, worker), Box::new(Collect))
    }

    /// Shuffle producer partitioning rows by the given key columns.
    pub fn shuffle(topology: ExchangeTopology, key_columns: Vec<usize>) -> Result<Self> {
        let policy = HashPartition::try_new(key_columns)?;
        Self::try_new(topology, Box::new(policy))
    }

    pub fn topology(&self) -> &ExchangeTopology {
        &self.topology
    }

    /// Next sequence number per channel; exposed for tests and monitoring.
    pub fn sequence_numbers(&self) -> Vec<u64> {
        self.runtime
            .as_ref()
            .map(|rt| rt.channels.iter().map(|c| c.seq).collect())
            .unwrap_or_default()
    }

    fn runtime_mut(&mut self) -> Result<&mut ProducerRuntime> {
        self.runtime.as_mut().ok_or_else(|| {
            WeftError::illegal_state("Producer used before init or after cleanup")
        })
    }
}

impl BatchSink for Producer {
    fn init(&mut self, env: &ExecEnv, child_schema: &Schema) -> Result<()> {
        let own = env.worker_id()?;
        let pool = env.connection_pool()?;

        let mut channels: Vec<ProducerChannel> = Vec::new();
        for (id, destination) in self.topology.resolve_self(own) {
            let setup = pool.reserve(destination).and_then(|mut conn| {
                conn.send(Frame::StreamBegin { channel: id })?;
                Ok(conn)
            });
            let conn = match setup {
                Ok(conn) => conn,
                Err(err) => {
                    // Don't leak what was already reserved.
                    for channel in channels {
                        let _ = pool.release(channel.conn);
                    }
                    return Err(err);
                }
            };
            debug!(channel = %id, %destination, "opened producer channel");
            channels.push(ProducerChannel {
                id,
                destination,
                conn,
                seq: 0,
                buffer: TupleBatchBuffer::new(child_schema.clone()),
            });
        }

        self.runtime = Some(ProducerRuntime { pool, channels });
        Ok(())
    }

    fn consume(&mut self, batch: &TupleBatch) -> Result<()> {
        let routing = {
            let num_channels = self.runtime_mut()?.channels.len();
            self.policy.route(batch, num_channels)?
        };
        let rt = self.runtime_mut()?;
        let num_channels = rt.channels.len();

        match routing {
            Routing::AllChannels => {
                for idx in 0..num_channels {
                    rt.channels[idx].buffer.append_batch(batch)?;
                    rt.flush_filled(idx)?;
                }
            }
            Routing::Single(idx) => {
                if idx >= num_channels {
                    return Err(WeftError::invalid_argument(format!(
                        "Routing chose channel {idx}, producer has {num_channels}"
                    )));
                }
                rt.channels[idx].buffer.append_batch(batch)?;
                rt.flush_filled(idx)?;
            }
            Routing::PerRow(assignments) => {
                if assignments.len() != batch.num_rows() {
                    return Err(WeftError::invalid_argument(format!(
                        "Routing covered {} rows of a {}-row batch",
                        assignments.len(),
                        batch.num_rows()
                    )));
                }
                for (row, &idx) in assignments.iter().enumerate() {
                    if idx >= num_channels {
                        return Err(WeftError::invalid_argument(format!(
                            "Routing chose channel {idx}, producer has {num_channels}"
                        )));
                    }
                    rt.channels[idx].buffer.append_row(batch, row)?;
                }
                for idx in 0..num_channels {
                    rt.flush_filled(idx)?;
                }
            }
        }
        Ok(())
    }

    fn child_eos(&mut self) -> Result<()> {
        self.runtime_mut()?
            .flush_all_and_mark(|channel| Frame::StreamEnd { channel })
    }

    fn child_eoi(&mut self) -> Result<()> {
        self.runtime_mut()?
            .flush_all_and_mark(|channel| Frame::IterEnd { channel })
    }

    fn rewind(&mut self) -> Result<()> {
        // Buffers restart empty for the next round; connections and sequence
        // counters carry over.
        if let Some(rt) = &mut self.runtime {
            for channel in &mut rt.channels {
                channel.buffer = TupleBatchBuffer::new(channel.buffer.schema().clone());
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut first_err: Option<WeftError> = None;
        if let Some(ProducerRuntime { pool, channels }) = self.runtime.take() {
            for channel in channels {
                match pool.release(channel.conn) {
                    Ok(()) => {
                        debug!(
                            channel = %channel.id,
                            destination = %channel.destination,
                            "released producer channel"
                        );
                    }
                    Err(err) => {
                        warn!(channel = %channel.id, %err, "failed to release producer channel");
                        first_err.get_or_insert(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
