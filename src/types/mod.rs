#![forbid(unsafe_code)]
//! Identifier newtypes and the type bundle that parameterizes a graph.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Identifier of a partition (a disjoint shard of the vertex set).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[derive(Serialize, Deserialize)]
pub struct PartitionId(pub u32);

/// Identifier of a worker taking part in the computation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[derive(Serialize, Deserialize)]
pub struct WorkerId(pub u32);

/// Identifier of a request, unique per sender/destination pairing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct RequestId(pub u64);

/// Identifier of one physical connection handed out by a transport.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ConnectionId(pub u64);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

impl From<u32> for WorkerId {
    fn from(value: u32) -> Self {
        WorkerId(value)
    }
}

impl RequestId {
    /// Returns the identifier that follows this one.
    pub const fn next(self) -> Self {
        RequestId(self.0 + 1)
    }
}

/// Bound for vertex identifiers.
///
/// Hash and equality must agree with equality of the encoded bytes, which is
/// why floating point identifiers are not supported.
pub trait VertexId:
    Codec + Clone + Default + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
}

impl<T> VertexId for T where
    T: Codec + Clone + Default + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
}

/// Bound for vertex values, edge values and messages.
pub trait VertexValue: Codec + Clone + Default + fmt::Debug + Send + Sync + 'static {}

impl<T> VertexValue for T where T: Codec + Clone + Default + fmt::Debug + Send + Sync + 'static {}

/// Bundles the concrete types of one graph computation.
///
/// ```
/// use bsp_graph::types::GraphTypes;
///
/// struct PageRank;
///
/// impl GraphTypes for PageRank {
///     type Id = i64;
///     type Value = f64;
///     type EdgeValue = f32;
///     type Message = f64;
/// }
/// ```
pub trait GraphTypes: Send + Sync + 'static {
    /// Vertex identifier.
    type Id: VertexId;
    /// Per-vertex value.
    type Value: VertexValue;
    /// Per-edge value.
    type EdgeValue: VertexValue;
    /// Message exchanged between vertices.
    type Message: VertexValue;
}

/// The vertex record of a graph described by `G`.
pub type GraphVertex<G> = crate::graph::Vertex<
    <G as GraphTypes>::Id,
    <G as GraphTypes>::Value,
    <G as GraphTypes>::EdgeValue,
>;
