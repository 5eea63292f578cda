use super::{decode_pair, duplicate_target, encode_section, min_pair_len, EdgeContainer, EdgeIter};
use crate::error::Result;
use crate::primitives::bytes::buf::Cursor;
use crate::types::{VertexId, VertexValue};

/// Edges held in a vector ordered by target.
///
/// Lookups are binary searches; inserts and removals shift the tail. Iteration
/// and encoding follow target order, so equal sets encode to equal bytes.
#[derive(Clone, Debug)]
pub struct SortedEdges<I, E> {
    pairs: Vec<(I, E)>,
}

impl<I, E> Default for SortedEdges<I, E> {
    fn default() -> Self {
        Self { pairs: Vec::new() }
    }
}

impl<I: VertexId, E> SortedEdges<I, E> {
    fn position(&self, target: &I) -> std::result::Result<usize, usize> {
        self.pairs.binary_search_by(|(t, _)| t.cmp(target))
    }
}

impl<I: VertexId, E: VertexValue> EdgeContainer<I, E> for SortedEdges<I, E> {
    fn add_edge(&mut self, target: I, value: E) -> bool {
        match self.position(&target) {
            Ok(idx) => {
                self.pairs[idx].1 = value;
                false
            }
            Err(idx) => {
                self.pairs.insert(idx, (target, value));
                true
            }
        }
    }

    fn remove_edge(&mut self, target: &I) -> Option<E> {
        let idx = self.position(target).ok()?;
        Some(self.pairs.remove(idx).1)
    }

    fn edge_value(&self, target: &I) -> Option<E> {
        let idx = self.position(target).ok()?;
        Some(self.pairs[idx].1.clone())
    }

    fn edge_count(&self) -> usize {
        self.pairs.len()
    }

    fn edges(&self) -> EdgeIter<'_, I, E> {
        EdgeIter::pairs(self.pairs.iter())
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }

    fn encode_edges(&self, out: &mut Vec<u8>) {
        encode_section(self.pairs.len(), self.pairs.iter().map(|(t, v)| (t, v)), out);
    }

    fn decode_edges(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.pairs.clear();
        let count = cur.len_prefix(min_pair_len::<I, E>())?;
        self.pairs.reserve(count);
        for _ in 0..count {
            self.pairs.push(decode_pair::<I, E>(cur)?);
        }
        // Already sorted when written by this strategy; sort is linear then.
        self.pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(dup) = self.pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(duplicate_target(&dup[0].0));
        }
        Ok(())
    }
}
