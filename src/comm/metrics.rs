use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the delivery protocol on both sides of a connection.
///
/// The client records sends, resends, acknowledgements and permanent
/// failures; the server records applied, duplicate and rejected requests.
pub trait CommMetrics: Send + Sync {
    /// A new request was handed to the coordinator.
    fn request_sent(&self);

    /// A pending request was dispatched again.
    fn request_resent(&self);

    /// A pending request was acknowledged.
    fn ack_received(&self);

    /// A request reached permanent failure.
    fn request_failed(&self);

    /// A connection to a peer was established.
    fn connection_opened(&self);

    /// A connection was lost or could not be written to.
    fn connection_lost(&self);

    /// The server applied a request.
    fn request_applied(&self);

    /// The server saw a request id it had already applied.
    fn duplicate_request(&self);

    /// The server failed to apply a request.
    fn request_rejected(&self);
}

/// A [`CommMetrics`] implementation that discards everything.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopMetrics;

impl CommMetrics for NoopMetrics {
    fn request_sent(&self) {}
    fn request_resent(&self) {}
    fn ack_received(&self) {}
    fn request_failed(&self) {}
    fn connection_opened(&self) {}
    fn connection_lost(&self) {}
    fn request_applied(&self) {}
    fn duplicate_request(&self) {}
    fn request_rejected(&self) {}
}

/// Atomic counter implementation of [`CommMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Requests handed to the coordinator.
    pub requests_sent: AtomicU64,
    /// Redispatches of pending requests.
    pub requests_resent: AtomicU64,
    /// Acknowledgements matched to a pending request.
    pub acks_received: AtomicU64,
    /// Requests that failed permanently.
    pub requests_failed: AtomicU64,
    /// Connections established.
    pub connections_opened: AtomicU64,
    /// Connections lost.
    pub connections_lost: AtomicU64,
    /// Requests applied by the server.
    pub requests_applied: AtomicU64,
    /// Duplicate requests acknowledged without reapplying.
    pub duplicate_requests: AtomicU64,
    /// Requests the server failed to apply.
    pub requests_rejected: AtomicU64,
}

impl CounterMetrics {
    /// Reads one counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl CommMetrics for CounterMetrics {
    fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn request_resent(&self) {
        self.requests_resent.fetch_add(1, Ordering::Relaxed);
    }

    fn ack_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
    }

    fn request_applied(&self) {
        self.requests_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn duplicate_request(&self) {
        self.duplicate_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }
}
