use std::io::Read;

use crate::codec::{self, Codec};
use crate::error::Result;
use crate::primitives::bytes::{be, buf::Cursor};
use crate::types::{VertexId, VertexValue};

use super::edges::{Edge, EdgeContainer, EdgeIter, EdgeStrategy, Edges};

/// A vertex: identifier, value, outgoing edges and the halted flag.
///
/// Encoded as `[id][value][u32 edge count][(target, value) * count][u8 halted]`.
/// Decoding a vertex without a target instance yields the default edge
/// strategy; [`Codec::decode_into`] keeps the strategy of the target.
#[derive(Clone, Debug)]
pub struct Vertex<I, V, E> {
    id: I,
    value: V,
    edges: Edges<I, E>,
    halted: bool,
}

impl<I: VertexId, V: VertexValue, E: VertexValue> Vertex<I, V, E> {
    /// Creates an active vertex without edges.
    pub fn new(id: I, value: V, strategy: EdgeStrategy) -> Self {
        Self {
            id,
            value,
            edges: Edges::new(strategy),
            halted: false,
        }
    }

    /// Creates an active vertex with the given edges.
    pub fn with_edges(
        id: I,
        value: V,
        strategy: EdgeStrategy,
        edges: impl IntoIterator<Item = Edge<I, E>>,
    ) -> Self {
        Self {
            id,
            value,
            edges: Edges::from_edges(strategy, edges),
            halted: false,
        }
    }

    /// Vertex identifier.
    pub fn id(&self) -> &I {
        &self.id
    }

    /// Vertex value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Replaces the vertex value.
    pub fn set_value(&mut self, value: V) {
        self.value = value;
    }

    /// Mutable access to the vertex value.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Edge container.
    pub fn edges(&self) -> &Edges<I, E> {
        &self.edges
    }

    /// Mutable edge container.
    pub fn edges_mut(&mut self) -> &mut Edges<I, E> {
        &mut self.edges
    }

    /// Iterates over outgoing edges.
    pub fn iter_edges(&self) -> EdgeIter<'_, I, E> {
        self.edges.edges()
    }

    /// Adds or overwrites an edge; returns whether the target was new.
    pub fn add_edge(&mut self, target: I, value: E) -> bool {
        self.edges.add_edge(target, value)
    }

    /// Removes the edge to `target`.
    pub fn remove_edge(&mut self, target: &I) -> Option<E> {
        self.edges.remove_edge(target)
    }

    /// Value of the edge to `target`.
    pub fn edge_value(&self, target: &I) -> Option<E> {
        self.edges.edge_value(target)
    }

    /// Number of outgoing edges.
    pub fn num_edges(&self) -> usize {
        self.edges.edge_count()
    }

    /// Whether the vertex has voted to halt.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Marks the vertex inactive until it receives a message.
    pub fn vote_to_halt(&mut self) {
        self.halted = true;
    }

    /// Reactivates a halted vertex.
    pub fn wake_up(&mut self) {
        self.halted = false;
    }

    /// Resets this vertex in place, keeping the edge strategy and buffers.
    pub fn reset(&mut self, id: I, value: V) {
        self.id = id;
        self.value = value;
        self.edges.clear();
        self.halted = false;
    }
}

impl<I: VertexId, V: VertexValue, E: VertexValue> Default for Vertex<I, V, E> {
    fn default() -> Self {
        Self::new(I::default(), V::default(), EdgeStrategy::default())
    }
}

impl<I, V, E> PartialEq for Vertex<I, V, E>
where
    I: VertexId,
    V: VertexValue + PartialEq,
    E: VertexValue + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.value == other.value
            && self.halted == other.halted
            && self.edges == other.edges
    }
}

impl<I: VertexId, V: VertexValue, E: VertexValue> Codec for Vertex<I, V, E> {
    const MIN_ENCODED_LEN: usize = I::MIN_ENCODED_LEN + V::MIN_ENCODED_LEN + 4 + 1;

    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.value.encode(out);
        self.edges.encode_edges(out);
        self.halted.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let mut vertex = Self::default();
        vertex.decode_into(cur)?;
        Ok(vertex)
    }

    fn decode_into(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.id.decode_into(cur)?;
        self.value.decode_into(cur)?;
        self.edges.decode_edges(cur)?;
        self.halted = bool::decode(cur)?;
        Ok(())
    }

    fn copy_encoded(input: &mut dyn Read, out: &mut Vec<u8>) -> Result<()> {
        I::copy_encoded(input, out)?;
        V::copy_encoded(input, out)?;
        let at = out.len();
        codec::copy_exact(input, out, 4)?;
        let count = be::get_u32(&out[at..])?;
        for _ in 0..count {
            I::copy_encoded(input, out)?;
            E::copy_encoded(input, out)?;
        }
        bool::copy_encoded(input, out)
    }
}
