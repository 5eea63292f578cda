//! Exactly-once request delivery between workers.
//!
//! A [`DeliveryCoordinator`] on the sending worker keeps every request until
//! the destination acknowledges it and resends it, unchanged, after a timeout
//! or a lost connection. The destination's [`RequestServer`] applies each
//! `(sender, request id)` at most once through its [`DedupLedger`] and
//! acknowledges duplicates without applying them again. Together every
//! request is applied exactly once, or reported as failed from
//! [`DeliveryCoordinator::await_all`].

mod client;
mod envelope;
mod ledger;
#[cfg(any(test, feature = "testing"))]
pub mod mem;
mod messages;
mod metrics;
mod request;
mod server;
mod transport;

pub use client::DeliveryCoordinator;
pub use envelope::{Frame, RequestFrame, RequestType, ResponseFrame};
pub use ledger::{Admission, DedupLedger, SeenRequests};
#[cfg(any(test, feature = "testing"))]
pub use mem::{
    FaultAction, FaultInjector, FirstRequestFault, MemNetwork, MemTransport, NoFaults,
    RandomFaults,
};
pub use messages::MessageStore;
pub use metrics::{CommMetrics, CounterMetrics, NoopMetrics};
pub use request::{Request, VertexIdMessages, VertexIdMessagesIter};
pub use server::{RequestServer, ServerData};
pub use transport::{RequestHandler, ResponseHandler, Transport};
