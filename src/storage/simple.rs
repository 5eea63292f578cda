use std::fmt;
use std::io::Write;
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;
use tracing::debug;

use crate::codec::{self, Codec};
use crate::config::PartitionConfig;
use crate::error::Result;
use crate::types::{GraphTypes, GraphVertex, PartitionId};

use super::layout::{
    duplicate_key, min_entry_len, removed_while_writing, EntryDecoder, EntryEncoder,
};
use super::partition::{PartitionKind, PartitionStore, PartitionWriter};
use super::progress::{NoopProgress, Progress};

type VertexMap<G> = DashMap<<G as GraphTypes>::Id, GraphVertex<G>>;

/// Partition that keeps vertices decoded.
///
/// Trades memory for decode cost. Reads copy the stored vertex into the
/// scratch vertex so both partition kinds hand out references the same way.
/// The serialized form is identical to [`super::ByteArrayPartition`]'s.
pub struct SimplePartition<G: GraphTypes> {
    id: PartitionId,
    map: Arc<VertexMap<G>>,
    scratch: GraphVertex<G>,
    config: PartitionConfig,
    progress: Arc<dyn Progress>,
}

impl<G: GraphTypes> SimplePartition<G> {
    /// Creates an empty partition.
    pub fn new(id: PartitionId, config: &PartitionConfig) -> Self {
        Self {
            id,
            map: Arc::new(DashMap::with_shard_amount(config.shard_amount())),
            scratch: Self::blank(config),
            config: *config,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Installs the sink notified once per vertex during serialization.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    fn blank(config: &PartitionConfig) -> GraphVertex<G> {
        GraphVertex::<G>::new(G::Id::default(), G::Value::default(), config.edge_strategy)
    }

    pub(crate) fn absorb(&mut self, other: SimplePartition<G>) {
        match Arc::try_unwrap(other.map) {
            Ok(map) => {
                for (key, vertex) in map {
                    self.map.insert(key, vertex);
                }
            }
            Err(shared) => {
                for entry in shared.iter() {
                    self.map.insert(entry.key().clone(), entry.value().clone());
                }
            }
        }
    }

    fn hold_previous(&mut self, previous: Option<GraphVertex<G>>) -> Option<&GraphVertex<G>> {
        let previous = previous?;
        self.scratch = previous;
        Some(&self.scratch)
    }
}

impl<G: GraphTypes> PartitionStore<G> for SimplePartition<G> {
    fn id(&self) -> PartitionId {
        self.id
    }

    fn kind(&self) -> PartitionKind {
        PartitionKind::Simple
    }

    fn vertex_count(&self) -> usize {
        self.map.len()
    }

    fn contains_vertex(&self, id: &G::Id) -> bool {
        self.map.contains_key(id)
    }

    fn vertex_ids(&self) -> Vec<G::Id> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    fn load_vertex(&mut self, id: &G::Id) -> Result<bool> {
        let Some(stored) = self.map.get(id) else {
            return Ok(false);
        };
        self.scratch.clone_from(stored.value());
        Ok(true)
    }

    fn scratch(&self) -> &GraphVertex<G> {
        &self.scratch
    }

    fn put_vertex(&mut self, vertex: &GraphVertex<G>) -> Result<Option<&GraphVertex<G>>> {
        let previous = self.map.insert(vertex.id().clone(), vertex.clone());
        Ok(self.hold_previous(previous))
    }

    fn remove_vertex(&mut self, id: &G::Id) -> Result<Option<&GraphVertex<G>>> {
        let previous = self.map.remove(id).map(|(_, vertex)| vertex);
        Ok(self.hold_previous(previous))
    }

    fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()> {
        save_decoded::<G>(&self.map, vertex);
        Ok(())
    }

    fn edge_count(&mut self) -> Result<u64> {
        Ok(self
            .map
            .iter()
            .map(|entry| entry.value().num_edges() as u64)
            .sum())
    }

    fn writer(&self) -> PartitionWriter<G> {
        PartitionWriter::Simple(SimpleWriter {
            map: Arc::clone(&self.map),
        })
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let ids = self.vertex_ids();
        let mut encoder = EntryEncoder::new(self.id, ids.len(), out)?;
        let mut blob = Vec::new();
        for id in &ids {
            let vertex = self
                .map
                .get(id)
                .ok_or_else(|| removed_while_writing(self.id, id))?;
            codec::encode_with_size(vertex.value(), &mut blob)?;
            drop(vertex);
            encoder.push(id, &blob)?;
            self.progress.progress();
        }
        let written = encoder.finish()?;
        debug!(partition = %self.id, vertices = written, "partition.simple.write");
        Ok(())
    }

    fn read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let min_entry = min_entry_len::<G::Id>(GraphVertex::<G>::MIN_ENCODED_LEN);
        let mut decoder = EntryDecoder::new(bytes, min_entry)?;
        let id = decoder.partition_id();
        let mut staged: AHashMap<G::Id, GraphVertex<G>> =
            AHashMap::with_capacity(decoder.entry_count());
        while let Some((key, blob)) = decoder.next_entry::<G::Id>()? {
            if staged.contains_key(&key) {
                return Err(duplicate_key(id, &key));
            }
            let mut vertex = Self::blank(&self.config);
            codec::decode_into_with_size(blob, &mut vertex)?;
            staged.insert(key, vertex);
            self.progress.progress();
        }
        self.map.clear();
        let vertices = staged.len();
        for (key, vertex) in staged {
            self.map.insert(key, vertex);
        }
        self.id = id;
        debug!(partition = %id, vertices, "partition.simple.read");
        Ok(())
    }
}

impl<G: GraphTypes> fmt::Debug for SimplePartition<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplePartition")
            .field("id", &self.id)
            .field("vertices", &self.map.len())
            .field("edge_strategy", &self.config.edge_strategy)
            .finish()
    }
}

/// Cloneable mutation handle of a [`SimplePartition`].
pub struct SimpleWriter<G: GraphTypes> {
    map: Arc<VertexMap<G>>,
}

impl<G: GraphTypes> Clone for SimpleWriter<G> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
        }
    }
}

impl<G: GraphTypes> SimpleWriter<G> {
    /// Stores a copy of `vertex`; returns whether an entry was replaced.
    pub fn put_vertex(&self, vertex: &GraphVertex<G>) -> bool {
        self.map.insert(vertex.id().clone(), vertex.clone()).is_some()
    }

    /// Removes vertex `id`; returns whether it was present.
    pub fn remove_vertex(&self, id: &G::Id) -> bool {
        self.map.remove(id).is_some()
    }

    /// Overwrites the stored copy of `vertex` in place.
    pub fn save_vertex(&self, vertex: &GraphVertex<G>) {
        save_decoded::<G>(&self.map, vertex);
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.map.len()
    }
}

fn save_decoded<G: GraphTypes>(map: &VertexMap<G>, vertex: &GraphVertex<G>) {
    match map.get_mut(vertex.id()) {
        Some(mut stored) => stored.value_mut().clone_from(vertex),
        None => {
            map.insert(vertex.id().clone(), vertex.clone());
        }
    }
}
