//! Storage and messaging core for bulk-synchronous graph processing.
//!
//! Two halves make up the crate:
//!
//! - [`storage`]: partitions of the vertex set, held either as compact
//!   per-vertex byte blobs ([`storage::ByteArrayPartition`]) or as decoded
//!   vertices ([`storage::SimplePartition`]), with one serialized layout for
//!   checkpointing and for moving partitions between workers.
//! - [`comm`]: request delivery between workers in which every request is
//!   applied exactly once despite lost responses and dropped connections.
//!
//! ```
//! use bsp_graph::config::Config;
//! use bsp_graph::graph::Vertex;
//! use bsp_graph::storage::{Partition, PartitionStore};
//! use bsp_graph::types::{GraphTypes, PartitionId};
//!
//! struct Counts;
//!
//! impl GraphTypes for Counts {
//!     type Id = i64;
//!     type Value = i64;
//!     type EdgeValue = f32;
//!     type Message = i64;
//! }
//!
//! let config = Config::testing();
//! let mut partition = Partition::<Counts>::new(PartitionId(0), &config.partition());
//! let mut vertex = Vertex::new(7, 1, config.edge_strategy);
//! vertex.add_edge(8, 0.5);
//! partition.put_vertex(&vertex)?;
//! assert_eq!(partition.get_vertex(&7)?.map(|v| v.num_edges()), Some(1));
//! # Ok::<(), bsp_graph::GraphError>(())
//! ```

pub mod codec;
pub mod comm;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{GraphError, Result};
