//! Server-side record of applied requests.
//!
//! Request ids are scoped per logical sender and survive reconnects. Each
//! sender's ids are kept as a floor below which every id has been seen plus a
//! sparse set above it, so memory stays proportional to the ids still out of
//! order rather than to the number of requests ever applied.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::types::{RequestId, WorkerId};

/// Outcome of [`DedupLedger::accept`]. Both outcomes are acknowledged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The request was applied now.
    Applied,
    /// The request had been applied before and was skipped.
    Duplicate,
}

/// Set of request ids, compacted into a contiguous floor.
#[derive(Debug, Default, Clone)]
pub struct SeenRequests {
    floor: u64,
    above: BTreeSet<u64>,
}

impl SeenRequests {
    /// Whether `id` has been recorded.
    pub fn contains(&self, id: RequestId) -> bool {
        id.0 < self.floor || self.above.contains(&id.0)
    }

    /// Records `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: RequestId) -> bool {
        if id.0 < self.floor || !self.above.insert(id.0) {
            return false;
        }
        while self.above.remove(&self.floor) {
            self.floor += 1;
        }
        true
    }

    /// Number of recorded ids.
    pub fn len(&self) -> u64 {
        self.floor + self.above.len() as u64
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every id below this value has been recorded.
    pub fn floor(&self) -> RequestId {
        RequestId(self.floor)
    }

    /// Ids recorded individually above the floor.
    pub fn sparse_len(&self) -> usize {
        self.above.len()
    }
}

/// Per-sender ledgers of applied request ids.
#[derive(Debug, Default)]
pub struct DedupLedger {
    senders: DashMap<WorkerId, Arc<Mutex<SeenRequests>>>,
}

impl DedupLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `apply` unless `(sender, request_id)` was applied before.
    ///
    /// The sender's ledger stays locked while `apply` runs, so concurrent
    /// copies of one request cannot both apply. A failed `apply` is not
    /// recorded.
    pub fn accept<F>(&self, sender: WorkerId, request_id: RequestId, apply: F) -> Result<Admission>
    where
        F: FnOnce() -> Result<()>,
    {
        let slot = Arc::clone(self.senders.entry(sender).or_default().value());
        let mut seen = slot.lock();
        if seen.contains(request_id) {
            return Ok(Admission::Duplicate);
        }
        apply()?;
        seen.insert(request_id);
        Ok(Admission::Applied)
    }

    /// Whether `(sender, request_id)` has been applied.
    pub fn contains(&self, sender: WorkerId, request_id: RequestId) -> bool {
        self.senders
            .get(&sender)
            .map(|slot| slot.lock().contains(request_id))
            .unwrap_or(false)
    }

    /// Number of requests applied for `sender`.
    pub fn applied(&self, sender: WorkerId) -> u64 {
        self.senders
            .get(&sender)
            .map(|slot| slot.lock().len())
            .unwrap_or(0)
    }
}
