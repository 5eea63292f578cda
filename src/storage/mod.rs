//! Partition storage.
//!
//! A partition is one disjoint shard of the vertex set. Two implementations
//! share the [`PartitionStore`] contract and a single serialized layout:
//! [`ByteArrayPartition`] keeps each vertex as one blob and decodes on
//! demand, [`SimplePartition`] keeps vertices decoded. [`Partition`] wraps
//! either one and enforces that only partitions of the same kind merge.

mod byte_array;
mod layout;
mod partition;
pub mod progress;
mod simple;

pub use byte_array::{ByteArrayPartition, ByteArrayWriter};
pub use partition::{Partition, PartitionKind, PartitionStore, PartitionWriter, VertexCursor};
pub use progress::{CountingProgress, NoopProgress, Progress};
pub use simple::{SimplePartition, SimpleWriter};
