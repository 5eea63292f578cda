//! Error handling for partition storage and request delivery.
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error is
//! [`GraphError`]. The variants split into two groups:
//!
//! - transient conditions that the delivery layer recovers from on its own
//!   ([`GraphError::ConnectionClosed`], [`GraphError::Unreachable`] before the
//!   reconnect budget is spent), and
//! - fatal conditions that end the enclosing unit of work
//!   ([`GraphError::Corruption`], [`GraphError::CapabilityMismatch`],
//!   [`GraphError::DeliveryFailed`]).

use std::fmt;
use std::io;

use thiserror::Error;

use crate::types::{PartitionId, RequestId, WorkerId};

/// Result type for storage and messaging operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the partition store and the delivery protocol.
#[derive(Debug, Error)]
pub enum GraphError {
    /// I/O error from a reader or writer supplied by the caller.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoded data cannot be trusted.
    ///
    /// Raised for truncated records, blobs whose inner length disagrees with
    /// their outer frame, and duplicate keys inside one serialized partition.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Two partitions of different kinds were asked to merge.
    #[error("cannot merge a {found} partition into a {expected} partition")]
    CapabilityMismatch {
        /// Kind of the receiving partition.
        expected: &'static str,
        /// Kind of the partition that was offered.
        found: &'static str,
    },

    /// Invalid argument or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No route to the destination worker.
    #[error("worker {0} is unreachable")]
    Unreachable(WorkerId),

    /// The connection was closed before the frame could be written.
    #[error("connection closed")]
    ConnectionClosed,

    /// One or more requests reached permanent failure.
    #[error("{} request(s) permanently failed; first: {}", .0.len(), first_failure(.0))]
    DeliveryFailed(Vec<DeliveryFailure>),

    /// The component has been shut down.
    #[error("{0} is shut down")]
    Shutdown(&'static str),
}

impl GraphError {
    /// Builds a [`GraphError::Corruption`] from anything printable.
    pub fn corruption(msg: impl Into<String>) -> Self {
        GraphError::Corruption(msg.into())
    }

    /// Whether the delivery layer should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::ConnectionClosed | GraphError::Unreachable(_) | GraphError::Io(_)
        )
    }
}

/// Why a request was given up on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Every allowed attempt timed out without an acknowledgement.
    RetriesExhausted {
        /// Number of dispatch attempts made.
        attempts: u32,
    },
    /// Reconnecting to the destination kept failing.
    Unreachable {
        /// Number of consecutive failed connection attempts.
        reconnects: u32,
    },
    /// The destination reported that applying the request failed.
    Rejected(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted { attempts } => {
                write!(f, "no acknowledgement after {attempts} attempts")
            }
            FailureReason::Unreachable { reconnects } => {
                write!(f, "destination unreachable after {reconnects} reconnects")
            }
            FailureReason::Rejected(reason) => write!(f, "rejected by destination: {reason}"),
        }
    }
}

/// A request that reached the `PermanentFailure` state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Worker the request was addressed to.
    pub destination: WorkerId,
    /// Identifier of the failed request.
    pub request_id: RequestId,
    /// Terminal reason.
    pub reason: FailureReason,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request {} to worker {}: {}",
            self.request_id, self.destination, self.reason
        )
    }
}

fn first_failure(failures: &[DeliveryFailure]) -> String {
    failures
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".into())
}

/// Shorthand for a corruption error naming the offending partition.
pub(crate) fn partition_corruption(id: PartitionId, msg: impl fmt::Display) -> GraphError {
    GraphError::Corruption(format!("partition {id}: {msg}"))
}
