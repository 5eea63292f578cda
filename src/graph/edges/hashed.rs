use std::collections::hash_map::Entry;

use ahash::AHashMap;

use super::{decode_pair, duplicate_target, encode_section, min_pair_len, EdgeContainer, EdgeIter};
use crate::error::Result;
use crate::primitives::bytes::buf::Cursor;
use crate::types::{VertexId, VertexValue};

/// Edges held in a hash map keyed by target.
#[derive(Clone, Debug)]
pub struct HashedEdges<I, E> {
    map: AHashMap<I, E>,
}

impl<I, E> Default for HashedEdges<I, E> {
    fn default() -> Self {
        Self {
            map: AHashMap::new(),
        }
    }
}

impl<I: VertexId, E: VertexValue> EdgeContainer<I, E> for HashedEdges<I, E> {
    fn add_edge(&mut self, target: I, value: E) -> bool {
        self.map.insert(target, value).is_none()
    }

    fn remove_edge(&mut self, target: &I) -> Option<E> {
        self.map.remove(target)
    }

    fn edge_value(&self, target: &I) -> Option<E> {
        self.map.get(target).cloned()
    }

    fn edge_count(&self) -> usize {
        self.map.len()
    }

    fn edges(&self) -> EdgeIter<'_, I, E> {
        EdgeIter::map(self.map.iter())
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn encode_edges(&self, out: &mut Vec<u8>) {
        encode_section(self.map.len(), self.map.iter(), out);
    }

    fn decode_edges(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.map.clear();
        let count = cur.len_prefix(min_pair_len::<I, E>())?;
        self.map.reserve(count);
        for _ in 0..count {
            let (target, value) = decode_pair::<I, E>(cur)?;
            match self.map.entry(target) {
                Entry::Occupied(slot) => return Err(duplicate_target(slot.key())),
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
            }
        }
        Ok(())
    }
}
