//! Vertex records and their outgoing edge containers.

pub mod edges;
mod vertex;

pub use edges::{Edge, EdgeContainer, EdgeIter, EdgeStrategy, Edges, HashedEdges, LazyEdges, SortedEdges};
pub use vertex::Vertex;
