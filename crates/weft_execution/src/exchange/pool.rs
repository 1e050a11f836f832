//! Connection pool interface and the in-process loopback implementation.
//!
//! The pool is the single shared, cross-thread resource of the exchange
//! layer: it owns channel allocation and serializes reserve/release.
//! Producers hold their reserved connections exclusively between operator
//! init and cleanup. Real transports live outside this crate; the loopback
//! implementation here backs single-process multi-worker execution and
//! tests.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use weft_error::{Result, WeftError};

use super::{ExchangePairId, Frame, WorkerId};
use crate::fragment::CancelToken;

/// One reserved, long-lived channel to a destination worker.
pub trait Connection: Debug + Send {
    fn destination(&self) -> WorkerId;

    /// Write one frame. Frame order per connection is delivery order.
    fn send(&mut self, frame: Frame) -> Result<()>;
}

/// Supplies and manages the long-lived connections producers write to.
///
/// Implementations must serialize concurrent reserve/release calls.
pub trait ConnectionPool: Debug + Send + Sync {
    fn reserve(&self, worker: WorkerId) -> Result<Box<dyn Connection>>;
    fn release(&self, conn: Box<dyn Connection>) -> Result<()>;
}

/// A frame together with the worker that sent it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: WorkerId,
    pub frame: Frame,
}

/// Per-worker landing area for incoming exchange frames, keyed by channel.
///
/// Consumers poll their channel's queue non-blockingly or park on the
/// condvar for the blocking pull path.
#[derive(Debug, Default)]
pub struct ExchangeInbox {
    queues: Mutex<HashMap<ExchangePairId, VecDeque<Delivery>>>,
    wake: Condvar,
}

impl ExchangeInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, from: WorkerId, frame: Frame) {
        let mut queues = self.queues.lock();
        queues
            .entry(frame.channel())
            .or_default()
            .push_back(Delivery { from, frame });
        self.wake.notify_all();
    }

    /// Non-blocking receive; `None` means nothing queued right now.
    pub fn try_recv(&self, channel: ExchangePairId) -> Option<Delivery> {
        let mut queues = self.queues.lock();
        queues.get_mut(&channel).and_then(|q| q.pop_front())
    }

    /// Blocking receive. Cancellation surfaces as an error so the caller can
    /// still run cleanup.
    pub fn recv(&self, channel: ExchangePairId, cancel: &CancelToken) -> Result<Delivery> {
        let mut queues = self.queues.lock();
        loop {
            if let Some(delivery) = queues.get_mut(&channel).and_then(|q| q.pop_front()) {
                return Ok(delivery);
            }
            if cancel.is_cancelled() {
                return Err(WeftError::cancelled(format!(
                    "Interrupted while waiting on {channel}"
                )));
            }
            self.wake.wait_for(&mut queues, Duration::from_millis(20));
        }
    }

    /// Drop a channel's queue. Called on consumer cleanup.
    pub fn remove_channel(&self, channel: ExchangePairId) {
        let mut queues = self.queues.lock();
        queues.remove(&channel);
    }
}

/// Shared in-process exchange fabric: one inbox per worker.
#[derive(Debug, Default)]
pub struct LoopbackExchange {
    inboxes: Mutex<HashMap<WorkerId, Arc<ExchangeInbox>>>,
}

impl LoopbackExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inbox(&self, worker: WorkerId) -> Arc<ExchangeInbox> {
        let mut inboxes = self.inboxes.lock();
        inboxes.entry(worker).or_default().clone()
    }

    /// The pool handle one worker passes into its execution environment.
    pub fn pool_for(self: &Arc<Self>, own: WorkerId) -> LoopbackPool {
        LoopbackPool {
            exchange: self.clone(),
            own,
        }
    }
}

/// [`ConnectionPool`] over a [`LoopbackExchange`], bound to the reserving
/// worker so outgoing frames carry their origin.
#[derive(Debug, Clone)]
pub struct LoopbackPool {
    exchange: Arc<LoopbackExchange>,
    own: WorkerId,
}

impl ConnectionPool for LoopbackPool {
    fn reserve(&self, worker: WorkerId) -> Result<Box<dyn Connection>> {
        if worker.is_self_reference() {
            return Err(WeftError::channel(
                "Cannot reserve a connection to an unresolved self destination",
            ));
        }
        Ok(Box::new(LoopbackConnection {
            from: self.own,
            dest: worker,
            inbox: self.exchange.inbox(worker),
        }))
    }

    fn release(&self, conn: Box<dyn Connection>) -> Result<()> {
        drop(conn);
        Ok(())
    }
}

#[derive(Debug)]
struct LoopbackConnection {
    from: WorkerId,
    dest: WorkerId,
    inbox: Arc<ExchangeInbox>,
}

impl Connection for LoopbackConnection {
    fn destination(&self) -> WorkerId {
        self.dest
    }

    fn send(&mut self, frame: Frame) -> Result<()> {
        self.inbox.deposit(self.from, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_arrive_in_send_order() {
        let exchange = LoopbackExchange::new();
        let pool = exchange.pool_for(WorkerId::new(1));
        let channel = ExchangePairId::new_unique();

        let mut conn = pool.reserve(WorkerId::new(2)).unwrap();
        conn.send(Frame::StreamBegin { channel }).unwrap();
        conn.send(Frame::StreamEnd { channel }).unwrap();
        pool.release(conn).unwrap();

        let inbox = exchange.inbox(WorkerId::new(2));
        let first = inbox.try_recv(channel).unwrap();
        assert_eq!(WorkerId::new(1), first.from);
        assert!(matches!(first.frame, Frame::StreamBegin { .. }));
        assert!(matches!(
            inbox.try_recv(channel).unwrap().frame,
            Frame::StreamEnd { .. }
        ));
        assert!(inbox.try_recv(channel).is_none());
    }

    #[test]
    fn reserve_rejects_unresolved_self() {
        let exchange = LoopbackExchange::new();
        let pool = exchange.pool_for(WorkerId::new(1));
        pool.reserve(WorkerId::SELF)
            .expect_err("self sentinel must be resolved before reserve");
    }

    #[test]
    fn blocking_recv_observes_cancellation() {
        let exchange = LoopbackExchange::new();
        let inbox = exchange.inbox(WorkerId::new(1));
        let channel = ExchangePairId::new_unique();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = inbox.recv(channel, &cancel).unwrap_err();
        assert_eq!(weft_error::ErrorKind::Cancelled, err.kind());
    }
}
