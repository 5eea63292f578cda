//! Outgoing edge containers.
//!
//! The edges of one vertex form a set keyed by target. Three interchangeable
//! strategies implement [`EdgeContainer`]:
//!
//! - [`HashedEdges`] keeps a hash map, giving O(1) lookup and mutation.
//! - [`SortedEdges`] keeps a vector ordered by target with binary search.
//! - [`LazyEdges`] keeps the encoded edge section and only builds an
//!   in-memory list once the set is mutated.
//!
//! All three share one wire layout, `[u32 count][(target, value) * count]`, so
//! a section written by one strategy can be read by any other.

use std::collections::hash_map;
use std::marker::PhantomData;
use std::slice;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{GraphError, Result};
use crate::primitives::bytes::buf::Cursor;
use crate::types::{VertexId, VertexValue};

mod hashed;
mod lazy;
mod sorted;

pub use hashed::HashedEdges;
pub use lazy::LazyEdges;
pub use sorted::SortedEdges;

/// One outgoing edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge<I, E> {
    /// Target vertex.
    pub target: I,
    /// Edge value.
    pub value: E,
}

impl<I, E> Edge<I, E> {
    /// Creates an edge.
    pub fn new(target: I, value: E) -> Self {
        Self { target, value }
    }
}

/// Which in-memory representation a vertex uses for its edges.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrategy {
    /// Hash map keyed by target.
    #[default]
    Hashed,
    /// Vector sorted by target.
    Sorted,
    /// Encoded bytes, materialized on first mutation.
    Lazy,
}

impl EdgeStrategy {
    /// Short name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeStrategy::Hashed => "hashed",
            EdgeStrategy::Sorted => "sorted",
            EdgeStrategy::Lazy => "lazy",
        }
    }
}

/// Contract shared by every edge strategy.
///
/// Adding an edge whose target is already present overwrites its value and
/// returns `false`. Iteration order is unspecified but stable for one
/// instance between mutations.
pub trait EdgeContainer<I: VertexId, E: VertexValue> {
    /// Adds or overwrites the edge to `target`; returns whether it was new.
    fn add_edge(&mut self, target: I, value: E) -> bool;

    /// Removes the edge to `target`, returning its value.
    fn remove_edge(&mut self, target: &I) -> Option<E>;

    /// Value of the edge to `target`.
    fn edge_value(&self, target: &I) -> Option<E>;

    /// Number of edges.
    fn edge_count(&self) -> usize;

    /// Iterates over the edges.
    fn edges(&self) -> EdgeIter<'_, I, E>;

    /// Removes every edge, keeping allocations.
    fn clear(&mut self);

    /// Appends the encoded edge section to `out`.
    fn encode_edges(&self, out: &mut Vec<u8>);

    /// Replaces the contents with the edge section read from `cur`.
    fn decode_edges(&mut self, cur: &mut Cursor<'_>) -> Result<()>;
}

/// Iterator over the edges of any strategy.
pub struct EdgeIter<'a, I, E> {
    inner: IterInner<'a, I, E>,
}

enum IterInner<'a, I, E> {
    Map(hash_map::Iter<'a, I, E>),
    Pairs(slice::Iter<'a, (I, E)>),
    Encoded {
        cur: Cursor<'a>,
        remaining: usize,
        _marker: PhantomData<fn() -> (I, E)>,
    },
}

impl<'a, I, E> EdgeIter<'a, I, E> {
    pub(crate) fn map(iter: hash_map::Iter<'a, I, E>) -> Self {
        Self {
            inner: IterInner::Map(iter),
        }
    }

    pub(crate) fn pairs(iter: slice::Iter<'a, (I, E)>) -> Self {
        Self {
            inner: IterInner::Pairs(iter),
        }
    }

    /// Iterates over `count` pairs that were validated when stored.
    pub(crate) fn encoded(bytes: &'a [u8], count: usize) -> Self {
        Self {
            inner: IterInner::Encoded {
                cur: Cursor::new(bytes),
                remaining: count,
                _marker: PhantomData,
            },
        }
    }
}

impl<'a, I: Codec + Clone, E: Codec + Clone> Iterator for EdgeIter<'a, I, E> {
    type Item = Edge<I, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Map(iter) => iter.next().map(|(t, v)| Edge::new(t.clone(), v.clone())),
            IterInner::Pairs(iter) => iter.next().map(|(t, v)| Edge::new(t.clone(), v.clone())),
            IterInner::Encoded { cur, remaining, .. } => {
                if *remaining == 0 {
                    return None;
                }
                match decode_pair::<I, E>(cur) {
                    Ok((target, value)) => {
                        *remaining -= 1;
                        Some(Edge::new(target, value))
                    }
                    Err(_) => {
                        *remaining = 0;
                        None
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            IterInner::Map(iter) => iter.size_hint(),
            IterInner::Pairs(iter) => iter.size_hint(),
            IterInner::Encoded { remaining, .. } => (0, Some(*remaining)),
        }
    }
}

/// Edge container whose strategy is chosen at runtime.
#[derive(Clone, Debug)]
pub enum Edges<I, E> {
    /// See [`HashedEdges`].
    Hashed(HashedEdges<I, E>),
    /// See [`SortedEdges`].
    Sorted(SortedEdges<I, E>),
    /// See [`LazyEdges`].
    Lazy(LazyEdges<I, E>),
}

macro_rules! dispatch {
    ($self:expr, $edges:ident => $body:expr) => {
        match $self {
            Edges::Hashed($edges) => $body,
            Edges::Sorted($edges) => $body,
            Edges::Lazy($edges) => $body,
        }
    };
}

impl<I: VertexId, E: VertexValue> Edges<I, E> {
    /// Creates an empty container of the given strategy.
    pub fn new(strategy: EdgeStrategy) -> Self {
        match strategy {
            EdgeStrategy::Hashed => Edges::Hashed(HashedEdges::default()),
            EdgeStrategy::Sorted => Edges::Sorted(SortedEdges::default()),
            EdgeStrategy::Lazy => Edges::Lazy(LazyEdges::default()),
        }
    }

    /// Creates a container of the given strategy holding `edges`.
    pub fn from_edges(strategy: EdgeStrategy, edges: impl IntoIterator<Item = Edge<I, E>>) -> Self {
        let mut out = Self::new(strategy);
        for edge in edges {
            out.add_edge(edge.target, edge.value);
        }
        out
    }

    /// Strategy of this container.
    pub fn strategy(&self) -> EdgeStrategy {
        match self {
            Edges::Hashed(_) => EdgeStrategy::Hashed,
            Edges::Sorted(_) => EdgeStrategy::Sorted,
            Edges::Lazy(_) => EdgeStrategy::Lazy,
        }
    }
}

impl<I: VertexId, E: VertexValue> Default for Edges<I, E> {
    fn default() -> Self {
        Self::new(EdgeStrategy::default())
    }
}

impl<I: VertexId, E: VertexValue> EdgeContainer<I, E> for Edges<I, E> {
    fn add_edge(&mut self, target: I, value: E) -> bool {
        dispatch!(self, edges => edges.add_edge(target, value))
    }

    fn remove_edge(&mut self, target: &I) -> Option<E> {
        dispatch!(self, edges => edges.remove_edge(target))
    }

    fn edge_value(&self, target: &I) -> Option<E> {
        dispatch!(self, edges => edges.edge_value(target))
    }

    fn edge_count(&self) -> usize {
        dispatch!(self, edges => edges.edge_count())
    }

    fn edges(&self) -> EdgeIter<'_, I, E> {
        dispatch!(self, edges => edges.edges())
    }

    fn clear(&mut self) {
        dispatch!(self, edges => edges.clear())
    }

    fn encode_edges(&self, out: &mut Vec<u8>) {
        dispatch!(self, edges => edges.encode_edges(out))
    }

    fn decode_edges(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        dispatch!(self, edges => edges.decode_edges(cur))
    }
}

/// Set equality: same targets with equal values, regardless of strategy.
impl<I: VertexId, E: VertexValue + PartialEq> PartialEq for Edges<I, E> {
    fn eq(&self, other: &Self) -> bool {
        self.edge_count() == other.edge_count()
            && self
                .edges()
                .all(|edge| other.edge_value(&edge.target).as_ref() == Some(&edge.value))
    }
}

/// Smallest encoding of one (target, value) pair.
pub(crate) const fn min_pair_len<I: Codec, E: Codec>() -> usize {
    I::MIN_ENCODED_LEN + E::MIN_ENCODED_LEN
}

pub(crate) fn encode_section<'a, I, E>(
    count: usize,
    pairs: impl Iterator<Item = (&'a I, &'a E)>,
    out: &mut Vec<u8>,
) where
    I: Codec + 'a,
    E: Codec + 'a,
{
    out.extend_from_slice(&(count as u32).to_be_bytes());
    for (target, value) in pairs {
        target.encode(out);
        value.encode(out);
    }
}

pub(crate) fn decode_pair<I: Codec, E: Codec>(cur: &mut Cursor<'_>) -> Result<(I, E)> {
    let target = I::decode(cur)?;
    let value = E::decode(cur)?;
    Ok((target, value))
}

pub(crate) fn duplicate_target<I: std::fmt::Debug>(target: &I) -> GraphError {
    GraphError::corruption(format!("duplicate edge target {target:?}"))
}
