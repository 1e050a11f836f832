//! Data-plane exchange between workers.
//!
//! A [`producer::Producer`] forwards batches from its child to one or more
//! logical channels, each identified by an `(ExchangePairId, WorkerId)` pair.
//! The receiving side demultiplexes frames by channel id and reassembles the
//! stream using the per-channel sequence numbers.

pub mod pool;
pub mod producer;
pub mod topology;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use weft_sheaf::batch::TupleBatch;

static NEXT_EXCHANGE_PAIR_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide-unique id for one logical producer/consumer pairing point.
///
/// Generated once per plan compilation and shared by the producer and its
/// remote consumer counterpart.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ExchangePairId(u64);

impl ExchangePairId {
    pub fn new_unique() -> Self {
        ExchangePairId(NEXT_EXCHANGE_PAIR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(id: u64) -> Self {
        ExchangePairId(id)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangePairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange({})", self.0)
    }
}

/// Identity of a worker process.
///
/// Negative values are the self-reference sentinel: a topology built with
/// [`WorkerId::SELF`] can be shipped to every worker verbatim and is resolved
/// against the executing worker's own id at operator init.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WorkerId(i32);

impl WorkerId {
    pub const SELF: WorkerId = WorkerId(-1);

    pub const fn new(id: i32) -> Self {
        WorkerId(id)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_self_reference(self) -> bool {
        self.0 < 0
    }

    /// Replace the self-reference sentinel with the executing worker's id.
    pub const fn resolve(self, own: WorkerId) -> WorkerId {
        if self.is_self_reference() {
            own
        } else {
            self
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_self_reference() {
            write!(f, "worker(self)")
        } else {
            write!(f, "worker({})", self.0)
        }
    }
}

/// One message on an exchange channel.
///
/// `StreamBegin` is the channel-open handshake sent before any data so the
/// receiver can demultiplex logical channels sharing one physical connection.
/// `Data` frames carry a per-channel sequence number starting at 0; the
/// receiver uses it to verify ordering and detect drops or duplicates.
/// `IterEnd` is the soft round marker for iterative plans, `StreamEnd` the
/// hard end of the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    StreamBegin {
        channel: ExchangePairId,
    },
    Data {
        channel: ExchangePairId,
        seq: u64,
        batch: TupleBatch,
    },
    IterEnd {
        channel: ExchangePairId,
    },
    StreamEnd {
        channel: ExchangePairId,
    },
}

impl Frame {
    pub const fn channel(&self) -> ExchangePairId {
        match self {
            Frame::StreamBegin { channel }
            | Frame::Data { channel, .. }
            | Frame::IterEnd { channel }
            | Frame::StreamEnd { channel } => *channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_increase() {
        let a = ExchangePairId::new_unique();
        let b = ExchangePairId::new_unique();
        assert_ne!(a, b);
    }

    #[test]
    fn self_sentinel_resolution() {
        let own = WorkerId::new(7);
        assert_eq!(own, WorkerId::SELF.resolve(own));
        assert_eq!(WorkerId::new(3), WorkerId::new(3).resolve(own));
        assert!(WorkerId::SELF.is_self_reference());
        assert!(!own.is_self_reference());
    }
}
