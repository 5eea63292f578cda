use dashmap::DashMap;
use smallvec::SmallVec;

use crate::types::{GraphTypes, PartitionId};

use super::request::VertexIdMessages;

type Inbox<M> = SmallVec<[M; 4]>;

/// Incoming messages grouped by partition and destination vertex.
///
/// Delivery order between requests is not preserved; consumers must treat
/// a vertex's messages as a multiset.
pub struct MessageStore<G: GraphTypes> {
    partitions: DashMap<PartitionId, DashMap<G::Id, Inbox<G::Message>>>,
}

impl<G: GraphTypes> Default for MessageStore<G> {
    fn default() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }
}

impl<G: GraphTypes> MessageStore<G> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one message for `vertex` in `partition`.
    pub fn add_message(&self, partition: PartitionId, vertex: G::Id, message: G::Message) {
        self.partitions
            .entry(partition)
            .or_default()
            .entry(vertex)
            .or_default()
            .push(message);
    }

    /// Adds every message of a packed collection.
    pub fn add_messages(
        &self,
        partition: PartitionId,
        messages: &VertexIdMessages<G::Id, G::Message>,
    ) {
        let inboxes = self.partitions.entry(partition).or_default();
        for (vertex, message) in messages.iter() {
            inboxes.entry(vertex).or_default().push(message);
        }
    }

    /// Vertices with at least one message, across all partitions.
    pub fn destination_vertices(&self) -> Vec<G::Id> {
        self.partitions
            .iter()
            .flat_map(|p| p.value().iter().map(|e| e.key().clone()).collect::<Vec<_>>())
            .collect()
    }

    /// Vertices of `partition` with at least one message.
    pub fn partition_destinations(&self, partition: PartitionId) -> Vec<G::Id> {
        self.partitions
            .get(&partition)
            .map(|p| p.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Copy of the messages addressed to `vertex`, searching every partition.
    pub fn vertex_messages(&self, vertex: &G::Id) -> Vec<G::Message> {
        let mut out = Vec::new();
        for partition in self.partitions.iter() {
            if let Some(inbox) = partition.value().get(vertex) {
                out.extend(inbox.iter().cloned());
            }
        }
        out
    }

    /// Removes and returns the messages of `vertex` in `partition`.
    pub fn take_vertex_messages(&self, partition: PartitionId, vertex: &G::Id) -> Vec<G::Message> {
        self.partitions
            .get(&partition)
            .and_then(|p| p.remove(vertex))
            .map(|(_, inbox)| inbox.into_vec())
            .unwrap_or_default()
    }

    /// Total number of stored messages.
    pub fn message_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.value().iter().map(|e| e.value().len()).sum::<usize>())
            .sum()
    }

    /// Drops the messages of one partition.
    pub fn clear_partition(&self, partition: PartitionId) {
        self.partitions.remove(&partition);
    }

    /// Drops every message.
    pub fn clear(&self) {
        self.partitions.clear();
    }
}
