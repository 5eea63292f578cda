//! Whole-partition wire layout.
//!
//! ```text
//! [u32 partition id][u32 entry count]
//! entry count * [vertex id][u32 blob length][blob]
//! ```
//!
//! Every integer is big-endian. The blob repeats its own length in its first
//! four bytes; the two lengths must agree.

use std::io::{Read, Write};

use crate::codec::{self, Codec, SIZE_PREFIX_LEN};
use crate::error::{partition_corruption, GraphError, Result};
use crate::primitives::bytes::{be, buf::Cursor};
use crate::types::PartitionId;

const HEADER_LEN: usize = 8;

/// Streams entries behind the partition header.
///
/// The header carries the entry count, so the caller fixes the set of
/// entries before the first push and [`EntryEncoder::finish`] checks that
/// exactly that many followed.
pub(crate) struct EntryEncoder<'w> {
    id: PartitionId,
    out: &'w mut dyn Write,
    key: Vec<u8>,
    declared: u32,
    written: u32,
}

impl<'w> EntryEncoder<'w> {
    pub(crate) fn new(id: PartitionId, count: usize, out: &'w mut dyn Write) -> Result<Self> {
        let declared = u32::try_from(count)
            .map_err(|_| GraphError::InvalidArgument(format!("partition {id} exceeds u32 entries")))?;
        out.write_all(&id.0.to_be_bytes())?;
        out.write_all(&declared.to_be_bytes())?;
        Ok(Self {
            id,
            out,
            key: Vec::new(),
            declared,
            written: 0,
        })
    }

    pub(crate) fn push<I: Codec>(&mut self, key: &I, blob: &[u8]) -> Result<()> {
        if self.written == self.declared {
            return Err(GraphError::InvalidArgument(format!(
                "partition {} declared {} entries",
                self.id, self.declared
            )));
        }
        let blob_len = u32::try_from(blob.len()).map_err(|_| {
            GraphError::InvalidArgument(format!("blob of {} bytes exceeds u32 framing", blob.len()))
        })?;
        self.key.clear();
        key.encode(&mut self.key);
        self.out.write_all(&self.key)?;
        self.out.write_all(&blob_len.to_be_bytes())?;
        self.out.write_all(blob)?;
        self.written += 1;
        Ok(())
    }

    /// Flushes and returns the number of entries written.
    pub(crate) fn finish(self) -> Result<u32> {
        if self.written != self.declared {
            return Err(GraphError::InvalidArgument(format!(
                "partition {}: wrote {} of {} declared entries",
                self.id, self.written, self.declared
            )));
        }
        self.out.flush()?;
        Ok(self.written)
    }
}

/// Copies one serialized partition off `input` without reading past it.
///
/// Only the framing is checked here; [`EntryDecoder`] validates the copy.
pub(crate) fn read_frame<I: Codec>(input: &mut dyn Read) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(HEADER_LEN);
    codec::copy_exact(input, &mut frame, HEADER_LEN)?;
    let id = PartitionId(be::get_u32(&frame)?);
    let count = be::get_u32(&frame[4..])?;
    for _ in 0..count {
        I::copy_encoded(input, &mut frame).map_err(|err| framing_error(id, err))?;
        let at = frame.len();
        codec::copy_exact(input, &mut frame, 4).map_err(|err| framing_error(id, err))?;
        let outer = be::get_u32(&frame[at..])? as usize;
        codec::copy_exact(input, &mut frame, outer).map_err(|err| framing_error(id, err))?;
    }
    Ok(frame)
}

fn framing_error(id: PartitionId, err: GraphError) -> GraphError {
    match err {
        GraphError::Corruption(msg) => partition_corruption(id, msg),
        other => other,
    }
}

/// Reads entries back, checking framing and key/blob agreement.
pub(crate) struct EntryDecoder<'a> {
    id: PartitionId,
    cur: Cursor<'a>,
    remaining: usize,
}

impl<'a> EntryDecoder<'a> {
    /// Parses the header; `min_entry_len` bounds the declared entry count.
    pub(crate) fn new(bytes: &'a [u8], min_entry_len: usize) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let id = PartitionId(cur.u32()?);
        let remaining = cur
            .len_prefix(min_entry_len)
            .map_err(|err| partition_corruption(id, err))?;
        Ok(Self { id, cur, remaining })
    }

    pub(crate) fn partition_id(&self) -> PartitionId {
        self.id
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.remaining
    }

    /// Next `(key, blob)` pair; `None` once every declared entry was read.
    pub(crate) fn next_entry<I: Codec + PartialEq + std::fmt::Debug>(
        &mut self,
    ) -> Result<Option<(I, &'a [u8])>> {
        if self.remaining == 0 {
            self.cur
                .finish("partition")
                .map_err(|err| partition_corruption(self.id, err))?;
            return Ok(None);
        }
        self.remaining -= 1;
        let key = I::decode(&mut self.cur).map_err(|err| partition_corruption(self.id, err))?;
        let outer = self.cur.u32().map_err(|err| partition_corruption(self.id, err))? as usize;
        if outer < SIZE_PREFIX_LEN {
            return Err(partition_corruption(
                self.id,
                format!("blob for {key:?} is {outer} bytes, shorter than its prefix"),
            ));
        }
        let blob = self
            .cur
            .take(outer)
            .map_err(|err| partition_corruption(self.id, err))?;
        let body = codec::blob_body(blob).map_err(|err| partition_corruption(self.id, err))?;
        let embedded = I::decode(&mut Cursor::new(body))
            .map_err(|err| partition_corruption(self.id, err))?;
        if embedded != key {
            return Err(partition_corruption(
                self.id,
                format!("key {key:?} does not match blob id {embedded:?}"),
            ));
        }
        Ok(Some((key, blob)))
    }
}

/// Smallest encoding of one entry for vertex records of `min_record_len`.
pub(crate) const fn min_entry_len<I: Codec>(min_record_len: usize) -> usize {
    I::MIN_ENCODED_LEN + 4 + SIZE_PREFIX_LEN + min_record_len
}

pub(crate) fn duplicate_key<I: std::fmt::Debug>(id: PartitionId, key: &I) -> GraphError {
    partition_corruption(id, format!("duplicate vertex id {key:?}"))
}

pub(crate) fn removed_while_writing<I: std::fmt::Debug>(id: PartitionId, key: &I) -> GraphError {
    GraphError::InvalidArgument(format!(
        "partition {id}: vertex {key:?} was removed while the partition was written"
    ))
}
