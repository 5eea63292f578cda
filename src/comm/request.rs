//! Request bodies exchanged between workers.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;

use crate::codec::Codec;
use crate::error::{GraphError, Result};
use crate::primitives::bytes::buf::Cursor;
use crate::storage::PartitionStore;
use crate::types::{GraphTypes, PartitionId, VertexId, VertexValue};

use super::envelope::RequestType;

/// Messages addressed to vertices, packed as `(id, message)` pairs in one
/// growable byte buffer.
///
/// Encoded as `[u32 count][u32 byte length][pairs]`.
pub struct VertexIdMessages<I, M> {
    bytes: Vec<u8>,
    count: usize,
    _types: PhantomData<fn() -> (I, M)>,
}

impl<I, M> Default for VertexIdMessages<I, M> {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            count: 0,
            _types: PhantomData,
        }
    }
}

impl<I, M> Clone for VertexIdMessages<I, M> {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            count: self.count,
            _types: PhantomData,
        }
    }
}

impl<I: VertexId, M: VertexValue> VertexIdMessages<I, M> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one message for `id`.
    pub fn add(&mut self, id: &I, message: &M) {
        id.encode(&mut self.bytes);
        message.encode(&mut self.bytes);
        self.count += 1;
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no message was added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the packed pairs in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Iterates over `(id, message)` pairs in insertion order.
    pub fn iter(&self) -> VertexIdMessagesIter<'_, I, M> {
        VertexIdMessagesIter {
            cur: Cursor::new(&self.bytes),
            remaining: self.count,
            _types: PhantomData,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u32::try_from(self.count)
            .map_err(|_| GraphError::InvalidArgument("too many messages in one request".into()))?;
        let len = u32::try_from(self.bytes.len())
            .map_err(|_| GraphError::InvalidArgument("message batch exceeds u32 framing".into()))?;
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.bytes);
        Ok(())
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let count = cur.u32()? as usize;
        let len = cur.len_prefix(1)?;
        let bytes = cur.take(len)?;
        let mut check = Cursor::new(bytes);
        for _ in 0..count {
            I::decode(&mut check)?;
            M::decode(&mut check)?;
        }
        check.finish("vertex messages")?;
        Ok(Self {
            bytes: bytes.to_vec(),
            count,
            _types: PhantomData,
        })
    }
}

impl<I: VertexId, M: VertexValue> fmt::Debug for VertexIdMessages<I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexIdMessages")
            .field("count", &self.count)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Iterator over a [`VertexIdMessages`] collection.
pub struct VertexIdMessagesIter<'a, I, M> {
    cur: Cursor<'a>,
    remaining: usize,
    _types: PhantomData<fn() -> (I, M)>,
}

impl<'a, I: Codec, M: Codec> Iterator for VertexIdMessagesIter<'a, I, M> {
    type Item = (I, M);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let pair = I::decode(&mut self.cur).and_then(|id| Ok((id, M::decode(&mut self.cur)?)));
        match pair {
            Ok(pair) => {
                self.remaining -= 1;
                Some(pair)
            }
            Err(_) => {
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// One unit of work addressed to another worker.
pub enum Request<G: GraphTypes> {
    /// Messages grouped by destination partition.
    SendWorkerMessages(Vec<(PartitionId, VertexIdMessages<G::Id, G::Message>)>),
    /// A serialized partition to merge into the receiver's store.
    SendPartition(Bytes),
}

impl<G: GraphTypes> Request<G> {
    /// Builds a partition transfer from any partition.
    pub fn send_partition(partition: &impl PartitionStore<G>) -> Result<Self> {
        Ok(Request::SendPartition(Bytes::from(partition.to_bytes()?)))
    }

    /// Wire tag of this request.
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::SendWorkerMessages(_) => RequestType::SendWorkerMessages,
            Request::SendPartition(_) => RequestType::SendPartition,
        }
    }

    /// Encodes the request body.
    pub fn encode_payload(&self) -> Result<Bytes> {
        match self {
            Request::SendWorkerMessages(parts) => {
                let count = u32::try_from(parts.len()).map_err(|_| {
                    GraphError::InvalidArgument("too many partitions in one request".into())
                })?;
                let mut out = Vec::with_capacity(
                    4 + parts.iter().map(|(_, m)| 12 + m.byte_len()).sum::<usize>(),
                );
                out.extend_from_slice(&count.to_be_bytes());
                for (partition, messages) in parts {
                    out.extend_from_slice(&partition.0.to_be_bytes());
                    messages.encode(&mut out)?;
                }
                Ok(Bytes::from(out))
            }
            Request::SendPartition(bytes) => Ok(bytes.clone()),
        }
    }

    /// Decodes a request body of the given type.
    pub fn decode(request_type: RequestType, payload: &Bytes) -> Result<Self> {
        match request_type {
            RequestType::SendWorkerMessages => {
                let mut cur = Cursor::new(payload);
                let count = cur.len_prefix(12)?;
                let mut parts = Vec::with_capacity(count);
                for _ in 0..count {
                    let partition = PartitionId(cur.u32()?);
                    parts.push((partition, VertexIdMessages::decode(&mut cur)?));
                }
                cur.finish("worker messages")?;
                Ok(Request::SendWorkerMessages(parts))
            }
            RequestType::SendPartition => Ok(Request::SendPartition(payload.clone())),
        }
    }

    /// Total number of messages carried.
    pub fn message_count(&self) -> usize {
        match self {
            Request::SendWorkerMessages(parts) => parts.iter().map(|(_, m)| m.len()).sum(),
            Request::SendPartition(_) => 0,
        }
    }
}

impl<G: GraphTypes> fmt::Debug for Request<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::SendWorkerMessages(parts) => f
                .debug_struct("SendWorkerMessages")
                .field("partitions", &parts.len())
                .field("messages", &self.message_count())
                .finish(),
            Request::SendPartition(bytes) => f
                .debug_struct("SendPartition")
                .field("bytes", &bytes.len())
                .finish(),
        }
    }
}
