//! Partition that keeps every vertex as one serialized blob.
//!
//! A vertex costs a single heap allocation no matter how many edges it has.
//! Reads decode into one scratch vertex owned by the partition, so a whole
//! superstep over millions of vertices reuses the same in-memory record.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::mapref::entry::Entry;
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

type BlobMap<I> = DashMap<I, Vec<u8>>;

/// Partition mapping vertex ids to size-prefixed vertex blobs.
pub struct ByteArrayPartition<G: GraphTypes> {
    id: PartitionId,
    map: Arc<BlobMap<G::Id>>,
    scratch: GraphVertex<G>,
    config: PartitionConfig,
    progress: Arc<dyn Progress>,
}

impl<G: GraphTypes> ByteArrayPartition<G> {
    /// Creates an empty partition.
    pub fn new(id: PartitionId, config: &PartitionConfig) -> Self {
        Self {
            id,
            map: Arc::new(BlobMap::with_shard_amount(config.shard_amount())),
            scratch: GraphVertex::<G>::new(
                G::Id::default(),
                G::Value::default(),
                config.edge_strategy,
            ),
            config: *config,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Installs the sink notified once per vertex during serialization.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Stored blob of vertex `id`, copied out of the map.
    pub fn blob(&self, id: &G::Id) -> Option<Vec<u8>> {
        self.map.get(id).map(|blob| blob.value().clone())
    }

    /// Bytes held by all blobs.
    pub fn blob_bytes(&self) -> usize {
        self.map.iter().map(|entry| entry.value().len()).sum()
    }

    pub(crate) fn absorb(&mut self, other: ByteArrayPartition<G>) {
        match Arc::try_unwrap(other.map) {
            Ok(map) => {
                for (key, blob) in map {
                    self.map.insert(key, blob);
                }
            }
            Err(shared) => {
                for entry in shared.iter() {
                    self.map.insert(entry.key().clone(), entry.value().clone());
                }
            }
        }
    }

    fn decode_previous(&mut self, previous: Option<Vec<u8>>) -> Result<Option<&GraphVertex<G>>> {
        match previous {
            Some(blob) => {
                codec::decode_into_with_size(&blob, &mut self.scratch)?;
                Ok(Some(&self.scratch))
            }
            None => Ok(None),
        }
    }
}

impl<G: GraphTypes> PartitionStore<G> for ByteArrayPartition<G> {
    fn id(&self) -> PartitionId {
        self.id
    }

    fn kind(&self) -> PartitionKind {
        PartitionKind::ByteArray
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
        let Some(blob) = self.map.get(id) else {
            return Ok(false);
        };
        codec::decode_into_with_size(blob.value(), &mut self.scratch)?;
        Ok(true)
    }

    fn scratch(&self) -> &GraphVertex<G> {
        &self.scratch
    }

    fn put_vertex(&mut self, vertex: &GraphVertex<G>) -> Result<Option<&GraphVertex<G>>> {
        let blob = codec::to_bytes_with_size(vertex)?;
        let previous = self.map.insert(vertex.id().clone(), blob);
        self.decode_previous(previous)
    }

    fn remove_vertex(&mut self, id: &G::Id) -> Result<Option<&GraphVertex<G>>> {
        let previous = self.map.remove(id).map(|(_, blob)| blob);
        self.decode_previous(previous)
    }

    fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()> {
        save_blob::<G>(&self.map, vertex)
    }

    fn edge_count(&mut self) -> Result<u64> {
        let mut total = 0u64;
        for entry in self.map.iter() {
            codec::decode_into_with_size(entry.value(), &mut self.scratch)?;
            total += self.scratch.num_edges() as u64;
        }
        Ok(total)
    }

    fn writer(&self) -> PartitionWriter<G> {
        PartitionWriter::ByteArray(ByteArrayWriter {
            map: Arc::clone(&self.map),
        })
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        let ids = self.vertex_ids();
        let mut encoder = EntryEncoder::new(self.id, ids.len(), out)?;
        for id in &ids {
            let blob = self
                .map
                .get(id)
                .ok_or_else(|| removed_while_writing(self.id, id))?;
            encoder.push(id, blob.value())?;
            self.progress.progress();
        }
        let written = encoder.finish()?;
        debug!(partition = %self.id, vertices = written, "partition.byte_array.write");
        Ok(())
    }

    fn read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let min_entry = min_entry_len::<G::Id>(GraphVertex::<G>::MIN_ENCODED_LEN);
        let mut decoder = EntryDecoder::new(bytes, min_entry)?;
        let id = decoder.partition_id();
        let mut staged: AHashMap<G::Id, Vec<u8>> = AHashMap::with_capacity(decoder.entry_count());
        while let Some((key, blob)) = decoder.next_entry::<G::Id>()? {
            if staged.contains_key(&key) {
                return Err(duplicate_key(id, &key));
            }
            staged.insert(key, blob.to_vec());
            self.progress.progress();
        }
        self.map.clear();
        let vertices = staged.len();
        for (key, blob) in staged {
            self.map.insert(key, blob);
        }
        self.id = id;
        debug!(partition = %id, vertices, "partition.byte_array.read");
        Ok(())
    }
}

impl<G: GraphTypes> fmt::Debug for ByteArrayPartition<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArrayPartition")
            .field("id", &self.id)
            .field("vertices", &self.map.len())
            .field("edge_strategy", &self.config.edge_strategy)
            .finish()
    }
}

/// Cloneable mutation handle of a [`ByteArrayPartition`].
pub struct ByteArrayWriter<G: GraphTypes> {
    map: Arc<BlobMap<G::Id>>,
}

impl<G: GraphTypes> Clone for ByteArrayWriter<G> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
        }
    }
}

impl<G: GraphTypes> ByteArrayWriter<G> {
    /// Stores `vertex`; returns whether an entry was replaced.
    pub fn put_vertex(&self, vertex: &GraphVertex<G>) -> Result<bool> {
        let blob = codec::to_bytes_with_size(vertex)?;
        Ok(self.map.insert(vertex.id().clone(), blob).is_some())
    }

    /// Removes vertex `id`; returns whether it was present.
    pub fn remove_vertex(&self, id: &G::Id) -> bool {
        self.map.remove(id).is_some()
    }

    /// Re-encodes `vertex` into the blob already stored for its id.
    pub fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()> {
        save_blob::<G>(&self.map, vertex)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.map.len()
    }
}

fn save_blob<G: GraphTypes>(map: &BlobMap<G::Id>, vertex: &GraphVertex<G>) -> Result<()> {
    match map.entry(vertex.id().clone()) {
        Entry::Occupied(mut slot) => codec::encode_with_size(vertex, slot.get_mut()),
        Entry::Vacant(slot) => {
            slot.insert(codec::to_bytes_with_size(vertex)?);
            Ok(())
        }
    }
}
