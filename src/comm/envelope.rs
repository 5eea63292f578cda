//! Request and response frames.
//!
//! ```text
//! request:  [u8 1][u32 sender][u64 request id][u8 request type][u32 len][payload]
//! ack:      [u8 2][u32 responder][u64 request id]
//! failed:   [u8 3][u32 responder][u64 request id][u32 len][utf-8 reason]
//! ```
//!
//! All integers are big-endian. A request frame is encoded once and resent
//! byte for byte, so a redispatch always carries the original request id.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{GraphError, Result};
use crate::primitives::bytes::buf::Cursor;
use crate::types::{RequestId, WorkerId};

/// Leading byte of a request frame.
pub const REQUEST_TAG: u8 = 1;
/// Leading byte of an acknowledgement.
pub const ACK_TAG: u8 = 2;
/// Leading byte of a failure response.
pub const FAILED_TAG: u8 = 3;

const REQUEST_HEADER_LEN: usize = 1 + 4 + 8 + 1 + 4;
const RESPONSE_HEADER_LEN: usize = 1 + 4 + 8;

/// Kind of work a request carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestType {
    /// Messages for vertices hosted by the destination.
    SendWorkerMessages = 1,
    /// A whole serialized partition.
    SendPartition = 2,
}

impl TryFrom<u8> for RequestType {
    type Error = GraphError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RequestType::SendWorkerMessages),
            2 => Ok(RequestType::SendPartition),
            other => Err(GraphError::corruption(format!("unknown request type {other}"))),
        }
    }
}

/// A request as it travels between workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFrame {
    /// Logical sender.
    pub sender: WorkerId,
    /// Identifier assigned by the sender for this destination.
    pub request_id: RequestId,
    /// Payload kind.
    pub request_type: RequestType,
    /// Encoded request body.
    pub payload: Bytes,
}

impl RequestFrame {
    /// Encodes the frame.
    pub fn encode(&self) -> Result<Bytes> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            GraphError::InvalidArgument(format!(
                "request payload of {} bytes exceeds u32 framing",
                self.payload.len()
            ))
        })?;
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_LEN + self.payload.len());
        buf.put_u8(REQUEST_TAG);
        buf.put_u32(self.sender.0);
        buf.put_u64(self.request_id.0);
        buf.put_u8(self.request_type as u8);
        buf.put_u32(len);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// The answer to one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseFrame {
    /// The request id is recorded at the responder.
    Ack {
        /// Worker that processed the request.
        responder: WorkerId,
        /// Acknowledged request.
        request_id: RequestId,
    },
    /// Applying the request failed; it will not be retried.
    Failed {
        /// Worker that processed the request.
        responder: WorkerId,
        /// Failed request.
        request_id: RequestId,
        /// Human-readable cause.
        reason: String,
    },
}

impl ResponseFrame {
    /// Worker that produced the response.
    pub fn responder(&self) -> WorkerId {
        match self {
            ResponseFrame::Ack { responder, .. } | ResponseFrame::Failed { responder, .. } => {
                *responder
            }
        }
    }

    /// Request the response refers to.
    pub fn request_id(&self) -> RequestId {
        match self {
            ResponseFrame::Ack { request_id, .. } | ResponseFrame::Failed { request_id, .. } => {
                *request_id
            }
        }
    }

    /// Encodes the frame.
    pub fn encode(&self) -> Bytes {
        match self {
            ResponseFrame::Ack {
                responder,
                request_id,
            } => {
                let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_LEN);
                buf.put_u8(ACK_TAG);
                buf.put_u32(responder.0);
                buf.put_u64(request_id.0);
                buf.freeze()
            }
            ResponseFrame::Failed {
                responder,
                request_id,
                reason,
            } => {
                // Oversized reasons are clipped at a char boundary.
                let reason = clip_utf8(reason, u32::MAX as usize);
                let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_LEN + 4 + reason.len());
                buf.put_u8(FAILED_TAG);
                buf.put_u32(responder.0);
                buf.put_u64(request_id.0);
                buf.put_u32(reason.len() as u32);
                buf.put_slice(reason.as_bytes());
                buf.freeze()
            }
        }
    }
}

/// Any frame read off a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A request.
    Request(RequestFrame),
    /// A response.
    Response(ResponseFrame),
}

impl Frame {
    /// Decodes one complete frame. The request payload shares `bytes`.
    pub fn decode(bytes: &Bytes) -> Result<Frame> {
        let mut cur = Cursor::new(bytes);
        let frame = match cur.u8()? {
            REQUEST_TAG => {
                let sender = WorkerId(cur.u32()?);
                let request_id = RequestId(cur.u64()?);
                let request_type = RequestType::try_from(cur.u8()?)?;
                let len = cur.len_prefix(1)?;
                let start = cur.position();
                cur.take(len)?;
                Frame::Request(RequestFrame {
                    sender,
                    request_id,
                    request_type,
                    payload: bytes.slice(start..start + len),
                })
            }
            ACK_TAG => Frame::Response(ResponseFrame::Ack {
                responder: WorkerId(cur.u32()?),
                request_id: RequestId(cur.u64()?),
            }),
            FAILED_TAG => {
                let responder = WorkerId(cur.u32()?);
                let request_id = RequestId(cur.u64()?);
                let len = cur.len_prefix(1)?;
                let reason = String::from_utf8_lossy(cur.take(len)?).into_owned();
                Frame::Response(ResponseFrame::Failed {
                    responder,
                    request_id,
                    reason,
                })
            }
            other => return Err(GraphError::corruption(format!("unknown frame tag {other}"))),
        };
        cur.finish("frame")?;
        Ok(frame)
    }
}

fn clip_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
