use serde::{Deserialize, Serialize};
use weft_error::{Result, WeftError};

use super::{ExchangePairId, WorkerId};

/// The set of logical channels a producer writes to.
///
/// Built once at plan-compile time and immutable for the plan's lifetime.
/// Destinations may be the [`WorkerId::SELF`] sentinel; resolution against
/// the executing worker happens at operator init, so the same descriptor is
/// reusable verbatim on every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTopology {
    channels: Vec<(ExchangePairId, WorkerId)>,
}

impl ExchangeTopology {
    /// Pair ids and workers positionally: channel `i` is `(ids[i], workers[i])`.
    pub fn one_to_one(ids: Vec<ExchangePairId>, workers: Vec<WorkerId>) -> Result<Self> {
        if ids.len() != workers.len() {
            return Err(WeftError::invalid_argument(format!(
                "One-to-one topology requires matching lengths, got {} ids and {} workers",
                ids.len(),
                workers.len()
            )));
        }
        Self::from_channels(ids.into_iter().zip(workers).collect())
    }

    /// Every id paired with every worker: `ids.len() * workers.len()`
    /// channels, worker-major (all ids for the first worker, then the next).
    pub fn cross_product(ids: Vec<ExchangePairId>, workers: Vec<WorkerId>) -> Result<Self> {
        let mut channels = Vec::with_capacity(ids.len() * workers.len());
        for &worker in &workers {
            for &id in &ids {
                channels.push((id, worker));
            }
        }
        Self::from_channels(channels)
    }

    /// A single channel: all tuples to one destination.
    pub fn collect(id: ExchangePairId, worker: WorkerId) -> Self {
        ExchangeTopology {
            channels: vec![(id, worker)],
        }
    }

    fn from_channels(channels: Vec<(ExchangePairId, WorkerId)>) -> Result<Self> {
        if channels.is_empty() {
            return Err(WeftError::invalid_argument(
                "Topology requires at least one channel",
            ));
        }
        Ok(ExchangeTopology { channels })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[(ExchangePairId, WorkerId)] {
        &self.channels
    }

    /// Destination list with the self sentinel replaced by `own`.
    pub fn resolve_self(&self, own: WorkerId) -> Vec<(ExchangePairId, WorkerId)> {
        self.channels
            .iter()
            .map(|&(id, worker)| (id, worker.resolve(own)))
            .collect()
    }
}
