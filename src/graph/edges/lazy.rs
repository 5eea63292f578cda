use ahash::AHashSet;

use super::{decode_pair, duplicate_target, encode_section, min_pair_len, EdgeContainer, EdgeIter};
use crate::error::Result;
use crate::primitives::bytes::buf::Cursor;
use crate::types::{VertexId, VertexValue};

/// Edges kept in their encoded form until the set is mutated.
///
/// Decoding validates the section, rejects repeated targets like the indexed
/// strategies do, and copies its bytes into a buffer that is reused across
/// decodes. Lookups scan the bytes. The first mutation materializes the pairs
/// into a vector in encoded order.
#[derive(Clone, Debug)]
pub struct LazyEdges<I, E> {
    encoded: Vec<u8>,
    count: usize,
    pairs: Vec<(I, E)>,
    materialized: bool,
    seen: AHashSet<I>,
}

impl<I, E> Default for LazyEdges<I, E> {
    fn default() -> Self {
        Self {
            encoded: Vec::new(),
            count: 0,
            pairs: Vec::new(),
            materialized: false,
            seen: AHashSet::new(),
        }
    }
}

impl<I: VertexId, E: VertexValue> LazyEdges<I, E> {
    /// Whether a mutation has turned the encoded bytes into a list.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    fn materialize(&mut self) {
        if self.materialized {
            return;
        }
        self.pairs.clear();
        self.pairs.extend(
            EdgeIter::<I, E>::encoded(&self.encoded, self.count).map(|e| (e.target, e.value)),
        );
        self.encoded.clear();
        self.count = 0;
        self.materialized = true;
    }

    fn position(&self, target: &I) -> Option<usize> {
        self.pairs.iter().position(|(t, _)| t == target)
    }
}

impl<I: VertexId, E: VertexValue> EdgeContainer<I, E> for LazyEdges<I, E> {
    fn add_edge(&mut self, target: I, value: E) -> bool {
        self.materialize();
        match self.position(&target) {
            Some(idx) => {
                self.pairs[idx].1 = value;
                false
            }
            None => {
                self.pairs.push((target, value));
                true
            }
        }
    }

    fn remove_edge(&mut self, target: &I) -> Option<E> {
        if !self.materialized && self.edge_value(target).is_none() {
            return None;
        }
        self.materialize();
        let idx = self.position(target)?;
        Some(self.pairs.remove(idx).1)
    }

    fn edge_value(&self, target: &I) -> Option<E> {
        if self.materialized {
            return self.position(target).map(|idx| self.pairs[idx].1.clone());
        }
        self.edges()
            .find(|edge| &edge.target == target)
            .map(|edge| edge.value)
    }

    fn edge_count(&self) -> usize {
        if self.materialized {
            self.pairs.len()
        } else {
            self.count
        }
    }

    fn edges(&self) -> EdgeIter<'_, I, E> {
        if self.materialized {
            EdgeIter::pairs(self.pairs.iter())
        } else {
            EdgeIter::encoded(&self.encoded, self.count)
        }
    }

    fn clear(&mut self) {
        self.encoded.clear();
        self.pairs.clear();
        self.count = 0;
        self.materialized = false;
    }

    fn encode_edges(&self, out: &mut Vec<u8>) {
        if self.materialized {
            encode_section(self.pairs.len(), self.pairs.iter().map(|(t, v)| (t, v)), out);
        } else {
            out.extend_from_slice(&(self.count as u32).to_be_bytes());
            out.extend_from_slice(&self.encoded);
        }
    }

    fn decode_edges(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.clear();
        let count = cur.len_prefix(min_pair_len::<I, E>())?;
        let start = cur.position();
        self.seen.clear();
        for _ in 0..count {
            let (target, _) = decode_pair::<I, E>(cur)?;
            if let Some(dup) = self.seen.replace(target) {
                self.seen.clear();
                return Err(duplicate_target(&dup));
            }
        }
        self.seen.clear();
        self.encoded.extend_from_slice(cur.consumed_since(start));
        self.count = count;
        Ok(())
    }
}
