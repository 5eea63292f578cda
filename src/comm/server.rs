//! Request server: decodes inbound frames, deduplicates them through the
//! ledger and applies them to the worker's partitions and message store.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::PartitionConfig;
use crate::error::Result;
use crate::storage::{Partition, PartitionStore};
use crate::types::{GraphTypes, PartitionId, WorkerId};

use super::envelope::{Frame, RequestFrame, ResponseFrame};
use super::ledger::{Admission, DedupLedger};
use super::messages::MessageStore;
use super::metrics::{CommMetrics, NoopMetrics};
use super::request::Request;
use super::transport::RequestHandler;

/// Everything a worker holds between supersteps.
pub struct ServerData<G: GraphTypes> {
    partitions: DashMap<PartitionId, Mutex<Partition<G>>>,
    messages: MessageStore<G>,
    config: PartitionConfig,
}

impl<G: GraphTypes> ServerData<G> {
    /// Creates empty server data.
    pub fn new(config: PartitionConfig) -> Self {
        Self {
            partitions: DashMap::new(),
            messages: MessageStore::new(),
            config,
        }
    }

    /// Incoming message store.
    pub fn messages(&self) -> &MessageStore<G> {
        &self.messages
    }

    /// Partition settings used for received partitions.
    pub fn partition_config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Adds `partition`, merging into an existing one with the same id.
    pub fn add_partition(&self, partition: Partition<G>) -> Result<()> {
        match self.partitions.entry(partition.id()) {
            Entry::Occupied(slot) => slot.get().lock().merge(partition),
            Entry::Vacant(slot) => {
                slot.insert(Mutex::new(partition));
                Ok(())
            }
        }
    }

    /// Removes and returns partition `id`.
    pub fn remove_partition(&self, id: PartitionId) -> Option<Partition<G>> {
        self.partitions
            .remove(&id)
            .map(|(_, partition)| partition.into_inner())
    }

    /// Runs `f` with exclusive access to partition `id`.
    pub fn with_partition<R>(
        &self,
        id: PartitionId,
        f: impl FnOnce(&mut Partition<G>) -> R,
    ) -> Option<R> {
        let slot = self.partitions.get(&id)?;
        let mut partition = slot.lock();
        Some(f(&mut partition))
    }

    /// Ids of the partitions held.
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self.partitions.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Total vertices over all partitions.
    pub fn vertex_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|e| e.value().lock().vertex_count())
            .sum()
    }

    fn apply(&self, request: Request<G>) -> Result<()> {
        match request {
            Request::SendWorkerMessages(parts) => {
                for (partition, messages) in &parts {
                    self.messages.add_messages(*partition, messages);
                }
                Ok(())
            }
            Request::SendPartition(bytes) => {
                let partition = Partition::from_bytes(&bytes, &self.config)?;
                self.add_partition(partition)
            }
        }
    }
}

/// Answers request frames for one worker.
pub struct RequestServer<G: GraphTypes> {
    worker: WorkerId,
    data: Arc<ServerData<G>>,
    ledger: DedupLedger,
    metrics: Arc<dyn CommMetrics>,
}

impl<G: GraphTypes> RequestServer<G> {
    /// Creates a server answering as `worker`.
    pub fn new(worker: WorkerId, data: Arc<ServerData<G>>) -> Self {
        Self::with_metrics(worker, data, Arc::new(NoopMetrics))
    }

    /// Creates a server that reports to `metrics`.
    pub fn with_metrics(
        worker: WorkerId,
        data: Arc<ServerData<G>>,
        metrics: Arc<dyn CommMetrics>,
    ) -> Self {
        Self {
            worker,
            data,
            ledger: DedupLedger::new(),
            metrics,
        }
    }

    /// Worker this server answers for.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Data the server applies requests to.
    pub fn data(&self) -> &Arc<ServerData<G>> {
        &self.data
    }

    /// Ledger of applied request ids.
    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Applies one request frame exactly once and builds its response.
    pub fn process(&self, frame: &RequestFrame) -> ResponseFrame {
        let outcome = self.ledger.accept(frame.sender, frame.request_id, || {
            let request = Request::<G>::decode(frame.request_type, &frame.payload)?;
            self.data.apply(request)
        });
        match outcome {
            Ok(Admission::Applied) => {
                self.metrics.request_applied();
                debug!(
                    sender = %frame.sender,
                    request_id = %frame.request_id,
                    request_type = ?frame.request_type,
                    "server.request.applied"
                );
                self.ack(frame)
            }
            Ok(Admission::Duplicate) => {
                self.metrics.duplicate_request();
                debug!(
                    sender = %frame.sender,
                    request_id = %frame.request_id,
                    "server.request.duplicate"
                );
                self.ack(frame)
            }
            Err(err) => {
                self.metrics.request_rejected();
                warn!(
                    sender = %frame.sender,
                    request_id = %frame.request_id,
                    error = %err,
                    "server.request.failed"
                );
                ResponseFrame::Failed {
                    responder: self.worker,
                    request_id: frame.request_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn ack(&self, frame: &RequestFrame) -> ResponseFrame {
        ResponseFrame::Ack {
            responder: self.worker,
            request_id: frame.request_id,
        }
    }
}

impl<G: GraphTypes> RequestHandler for RequestServer<G> {
    fn handle_request(&self, frame: Bytes) -> Option<Bytes> {
        match Frame::decode(&frame) {
            Ok(Frame::Request(request)) => Some(self.process(&request).encode()),
            Ok(Frame::Response(_)) => {
                warn!(worker = %self.worker, "server.frame.unexpected_response");
                None
            }
            Err(err) => {
                warn!(worker = %self.worker, error = %err, "server.frame.undecodable");
                None
            }
        }
    }
}
