//! Seams between the delivery protocol and whatever moves the bytes.
//!
//! A transport delivers frames in order per connection and may lose a
//! connection at any time. It never retries; retries belong to the
//! [`DeliveryCoordinator`](super::DeliveryCoordinator).

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::types::{ConnectionId, WorkerId};

/// Receives responses and connection loss for connections it registered.
///
/// Callbacks arrive on transport threads and must not block on the
/// transport.
pub trait ResponseHandler: Send + Sync {
    /// A response frame arrived on `connection`.
    fn on_response(&self, connection: ConnectionId, frame: Bytes);

    /// The remote end or the network closed `connection`.
    ///
    /// Not called for connections closed through [`Transport::close`].
    fn on_closed(&self, connection: ConnectionId);
}

/// Client side of a transport.
pub trait Transport: Send + Sync {
    /// Opens a connection to `peer`, routing its responses to `handler`.
    fn connect(&self, peer: WorkerId, handler: Arc<dyn ResponseHandler>) -> Result<ConnectionId>;

    /// Queues `frame` on `connection`; fails if the connection is gone.
    fn send(&self, connection: ConnectionId, frame: Bytes) -> Result<()>;

    /// Closes `connection`. Closing an unknown connection is a no-op.
    fn close(&self, connection: ConnectionId);
}

/// Server side: turns one inbound request frame into its response frame.
pub trait RequestHandler: Send + Sync {
    /// Processes `frame`; `None` means there is nothing to answer.
    fn handle_request(&self, frame: Bytes) -> Option<Bytes>;
}
