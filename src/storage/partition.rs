use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PartitionConfig;
use crate::error::{GraphError, Result};
use crate::types::{GraphTypes, GraphVertex, PartitionId};

use super::byte_array::{ByteArrayPartition, ByteArrayWriter};
use super::layout;
use super::progress::Progress;
use super::simple::{SimplePartition, SimpleWriter};

/// Which partition implementation holds a shard.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKind {
    /// Vertices kept as serialized blobs.
    #[default]
    ByteArray,
    /// Vertices kept decoded.
    Simple,
}

impl PartitionKind {
    /// Short name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            PartitionKind::ByteArray => "byte-array",
            PartitionKind::Simple => "simple",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations every partition implementation provides.
///
/// Methods that return a vertex reference decode into the partition's
/// scratch vertex and take `&mut self`: a returned reference stays valid
/// until the next such call, and the borrow checker rules out two live views
/// of the same partition. Mutation from other threads goes through
/// [`PartitionStore::writer`].
pub trait PartitionStore<G: GraphTypes> {
    /// Partition identifier.
    fn id(&self) -> PartitionId;

    /// Implementation kind.
    fn kind(&self) -> PartitionKind;

    /// Number of vertices.
    fn vertex_count(&self) -> usize;

    /// Whether a vertex with this id is present.
    fn contains_vertex(&self, id: &G::Id) -> bool;

    /// Snapshot of the vertex ids currently present.
    fn vertex_ids(&self) -> Vec<G::Id>;

    /// Decodes vertex `id` into the scratch vertex; `false` when absent.
    fn load_vertex(&mut self, id: &G::Id) -> Result<bool>;

    /// The scratch vertex, as left by the last decoding call.
    fn scratch(&self) -> &GraphVertex<G>;

    /// Stores `vertex`, returning the previous vertex with the same id.
    fn put_vertex(&mut self, vertex: &GraphVertex<G>) -> Result<Option<&GraphVertex<G>>>;

    /// Removes vertex `id`, returning it.
    fn remove_vertex(&mut self, id: &G::Id) -> Result<Option<&GraphVertex<G>>>;

    /// Writes `vertex` back, reusing the existing storage for its id.
    fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()>;

    /// Total number of edges over all vertices.
    fn edge_count(&mut self) -> Result<u64>;

    /// Handle for concurrent mutation from other threads.
    fn writer(&self) -> PartitionWriter<G>;

    /// Writes the whole partition.
    ///
    /// The set of ids is fixed when writing starts. Vertices added meanwhile
    /// are not written; removing one that is still to be written fails the
    /// call with a partial output.
    fn write_to(&self, out: &mut dyn Write) -> Result<()>;

    /// Replaces id and contents with a serialized partition.
    ///
    /// `bytes` must hold exactly one partition; anything after it is
    /// corruption. On error the partition is left unchanged.
    fn read_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Looks up vertex `id`.
    fn get_vertex(&mut self, id: &G::Id) -> Result<Option<&GraphVertex<G>>> {
        if self.load_vertex(id)? {
            Ok(Some(self.scratch()))
        } else {
            Ok(None)
        }
    }

    /// Reads one serialized partition from `input`.
    ///
    /// Consumes exactly that partition's bytes, so partitions written back to
    /// back come out of successive calls. Unlike [`PartitionStore::read_bytes`],
    /// bytes after the partition are left unread.
    fn read_from(&mut self, input: &mut dyn Read) -> Result<()> {
        let frame = layout::read_frame::<G::Id>(input)?;
        self.read_bytes(&frame)
    }

    /// Serializes the whole partition into a buffer.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Visits every vertex through the scratch vertex.
    fn cursor(&mut self) -> VertexCursor<'_, G, Self>
    where
        Self: Sized,
    {
        VertexCursor::new(self)
    }
}

/// Walks a partition one vertex at a time through its scratch vertex.
///
/// The set of ids is fixed when the cursor is created; ids removed
/// concurrently are skipped and ids added concurrently are not visited.
pub struct VertexCursor<'a, G: GraphTypes, P: ?Sized> {
    partition: &'a mut P,
    keys: std::vec::IntoIter<G::Id>,
    _types: PhantomData<fn() -> G>,
}

impl<'a, G: GraphTypes, P: PartitionStore<G> + ?Sized> VertexCursor<'a, G, P> {
    fn new(partition: &'a mut P) -> Self {
        let keys = partition.vertex_ids().into_iter();
        Self {
            partition,
            keys,
            _types: PhantomData,
        }
    }

    /// Decodes the next vertex; the reference is valid until the next call.
    pub fn next_vertex(&mut self) -> Option<Result<&GraphVertex<G>>> {
        loop {
            let key = self.keys.next()?;
            match self.partition.load_vertex(&key) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        Some(Ok(self.partition.scratch()))
    }

    /// Ids not yet visited.
    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

/// A partition of either kind.
pub enum Partition<G: GraphTypes> {
    /// See [`ByteArrayPartition`].
    ByteArray(ByteArrayPartition<G>),
    /// See [`SimplePartition`].
    Simple(SimplePartition<G>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Partition::ByteArray($p) => $body,
            Partition::Simple($p) => $body,
        }
    };
}

impl<G: GraphTypes> Partition<G> {
    /// Creates an empty partition of the configured kind.
    pub fn new(id: PartitionId, config: &PartitionConfig) -> Self {
        match config.partition_kind {
            PartitionKind::ByteArray => Partition::ByteArray(ByteArrayPartition::new(id, config)),
            PartitionKind::Simple => Partition::Simple(SimplePartition::new(id, config)),
        }
    }

    /// Creates a partition of the configured kind from serialized bytes.
    pub fn from_bytes(bytes: &[u8], config: &PartitionConfig) -> Result<Self> {
        let mut partition = Self::new(PartitionId::default(), config);
        partition.read_bytes(bytes)?;
        Ok(partition)
    }

    /// Installs the sink notified during serialization.
    pub fn with_progress(self, progress: Arc<dyn Progress>) -> Self {
        match self {
            Partition::ByteArray(p) => Partition::ByteArray(p.with_progress(progress)),
            Partition::Simple(p) => Partition::Simple(p.with_progress(progress)),
        }
    }

    /// Merges every vertex of `other` into this partition.
    ///
    /// On an id present in both, the vertex from `other` wins. Partitions of
    /// different kinds cannot be merged.
    pub fn merge(&mut self, other: Partition<G>) -> Result<()> {
        let (ours, theirs) = (self.kind(), other.kind());
        let incoming = other.vertex_count();
        match (&mut *self, other) {
            (Partition::ByteArray(dst), Partition::ByteArray(src)) => dst.absorb(src),
            (Partition::Simple(dst), Partition::Simple(src)) => dst.absorb(src),
            _ => {
                return Err(GraphError::CapabilityMismatch {
                    expected: ours.as_str(),
                    found: theirs.as_str(),
                })
            }
        }
        debug!(
            partition = %self.id(),
            kind = %ours,
            incoming,
            vertices = self.vertex_count(),
            "partition.merge"
        );
        Ok(())
    }
}

impl<G: GraphTypes> PartitionStore<G> for Partition<G> {
    fn id(&self) -> PartitionId {
        dispatch!(self, p => p.id())
    }

    fn kind(&self) -> PartitionKind {
        dispatch!(self, p => p.kind())
    }

    fn vertex_count(&self) -> usize {
        dispatch!(self, p => p.vertex_count())
    }

    fn contains_vertex(&self, id: &G::Id) -> bool {
        dispatch!(self, p => p.contains_vertex(id))
    }

    fn vertex_ids(&self) -> Vec<G::Id> {
        dispatch!(self, p => p.vertex_ids())
    }

    fn load_vertex(&mut self, id: &G::Id) -> Result<bool> {
        dispatch!(self, p => p.load_vertex(id))
    }

    fn scratch(&self) -> &GraphVertex<G> {
        dispatch!(self, p => p.scratch())
    }

    fn put_vertex(&mut self, vertex: &GraphVertex<G>) -> Result<Option<&GraphVertex<G>>> {
        dispatch!(self, p => p.put_vertex(vertex))
    }

    fn remove_vertex(&mut self, id: &G::Id) -> Result<Option<&GraphVertex<G>>> {
        dispatch!(self, p => p.remove_vertex(id))
    }

    fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()> {
        dispatch!(self, p => p.save_vertex(vertex))
    }

    fn edge_count(&mut self) -> Result<u64> {
        dispatch!(self, p => p.edge_count())
    }

    fn writer(&self) -> PartitionWriter<G> {
        dispatch!(self, p => p.writer())
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        dispatch!(self, p => p.write_to(out))
    }

    fn read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        dispatch!(self, p => p.read_bytes(bytes))
    }
}

impl<G: GraphTypes> fmt::Debug for Partition<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, p => fmt::Debug::fmt(p, f))
    }
}

/// Cloneable handle that mutates a partition from any thread.
///
/// Writers never touch the scratch vertex; they report whether an entry was
/// replaced or removed instead of returning the previous vertex.
pub enum PartitionWriter<G: GraphTypes> {
    /// Writer of a [`ByteArrayPartition`].
    ByteArray(ByteArrayWriter<G>),
    /// Writer of a [`SimplePartition`].
    Simple(SimpleWriter<G>),
}

impl<G: GraphTypes> Clone for PartitionWriter<G> {
    fn clone(&self) -> Self {
        match self {
            PartitionWriter::ByteArray(w) => PartitionWriter::ByteArray(w.clone()),
            PartitionWriter::Simple(w) => PartitionWriter::Simple(w.clone()),
        }
    }
}

impl<G: GraphTypes> PartitionWriter<G> {
    /// Stores `vertex`; returns whether it replaced an existing vertex.
    pub fn put_vertex(&self, vertex: &GraphVertex<G>) -> Result<bool> {
        match self {
            PartitionWriter::ByteArray(w) => w.put_vertex(vertex),
            PartitionWriter::Simple(w) => Ok(w.put_vertex(vertex)),
        }
    }

    /// Removes vertex `id`; returns whether it was present.
    pub fn remove_vertex(&self, id: &G::Id) -> bool {
        match self {
            PartitionWriter::ByteArray(w) => w.remove_vertex(id),
            PartitionWriter::Simple(w) => w.remove_vertex(id),
        }
    }

    /// Writes `vertex` back, reusing the existing storage for its id.
    pub fn save_vertex(&self, vertex: &GraphVertex<G>) -> Result<()> {
        match self {
            PartitionWriter::ByteArray(w) => w.save_vertex(vertex),
            PartitionWriter::Simple(w) => {
                w.save_vertex(vertex);
                Ok(())
            }
        }
    }

    /// Number of vertices in the underlying partition.
    pub fn vertex_count(&self) -> usize {
        match self {
            PartitionWriter::ByteArray(w) => w.vertex_count(),
            PartitionWriter::Simple(w) => w.vertex_count(),
        }
    }
}
