//! Client half of the delivery protocol.
//!
//! The [`DeliveryCoordinator`] assigns every request an id that increases per
//! destination, keeps the encoded frame until the destination acknowledges
//! it, and resends the identical frame when it times out or its connection
//! is lost. A background timer drives resends; [`DeliveryCoordinator::await_all`]
//! is the only call that blocks.
//!
//! Request state machine:
//!
//! ```text
//! Dispatched -> Acknowledged
//! Dispatched -> TimedOut -> Redispatched -> Dispatched
//! Dispatched -> PermanentFailure
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::DeliveryConfig;
use crate::error::{DeliveryFailure, FailureReason, GraphError, Result};
use crate::types::{Clock, ConnectionId, GraphTypes, RequestId, SystemClock, WorkerId};

use super::envelope::{Frame, RequestFrame, RequestType, ResponseFrame};
use super::metrics::{CommMetrics, NoopMetrics};
use super::request::Request;
use super::transport::{ResponseHandler, Transport};

/// Sends requests to other workers with exactly-once application.
///
/// Dropping the coordinator stops the timer and closes its connections;
/// requests still pending are abandoned.
pub struct DeliveryCoordinator {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    local: WorkerId,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn CommMetrics>,
    state: Mutex<ClientState>,
    settled: Condvar,
    wakeup: Condvar,
    me: Weak<Inner>,
}

#[derive(Default)]
struct ClientState {
    peers: HashMap<WorkerId, PeerState>,
    pending: FxHashMap<(WorkerId, RequestId), PendingRequest>,
    failures: Vec<DeliveryFailure>,
    /// Set when a connection is lost so the timer runs before its interval.
    resend_requested: bool,
    shutdown: bool,
}

#[derive(Default)]
struct PeerState {
    connection: Option<ConnectionId>,
    next_request_id: RequestId,
    reconnect_failures: u32,
}

struct PendingRequest {
    frame: Bytes,
    dispatched_at: Instant,
    attempts: u32,
    route: Route,
}

/// Where the latest copy of a pending frame went.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    /// A thread is connecting or writing; the timer leaves it alone until
    /// it expires.
    Dispatching,
    /// Written to this connection.
    Sent(ConnectionId),
    /// No connection could take the frame.
    Unsent,
}

/// Routes transport callbacks to a coordinator without keeping it alive.
struct ResponseRouter {
    inner: Weak<Inner>,
}

impl ResponseHandler for ResponseRouter {
    fn on_response(&self, connection: ConnectionId, frame: Bytes) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_response(connection, frame);
        }
    }

    fn on_closed(&self, connection: ConnectionId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_closed(connection);
        }
    }
}

impl DeliveryCoordinator {
    /// Creates a coordinator sending as `local` over `transport`.
    pub fn new(local: WorkerId, transport: Arc<dyn Transport>, config: DeliveryConfig) -> Self {
        Self::with_instrumentation(
            local,
            transport,
            config,
            Arc::new(SystemClock),
            Arc::new(NoopMetrics),
        )
    }

    /// Creates a coordinator with an explicit clock and metrics sink.
    pub fn with_instrumentation(
        local: WorkerId,
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn CommMetrics>,
    ) -> Self {
        let inner = Arc::new_cyclic(|me| Inner {
            local,
            transport,
            config,
            clock,
            metrics,
            state: Mutex::new(ClientState::default()),
            settled: Condvar::new(),
            wakeup: Condvar::new(),
            me: me.clone(),
        });
        let timer = Self::spawn_timer(Arc::clone(&inner));
        Self {
            inner,
            timer: Mutex::new(timer),
        }
    }

    fn spawn_timer(inner: Arc<Inner>) -> Option<JoinHandle<()>> {
        let name = format!("delivery-timer-{}", inner.local);
        match thread::Builder::new()
            .name(name)
            .spawn(move || Self::timer_loop(inner))
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "delivery.timer.spawn_failed");
                None
            }
        }
    }

    fn timer_loop(inner: Arc<Inner>) {
        loop {
            {
                let mut state = inner.state.lock();
                if state.shutdown {
                    break;
                }
                if !state.resend_requested {
                    inner.wakeup.wait_for(&mut state, inner.config.waiting_interval);
                }
                if state.shutdown {
                    break;
                }
                state.resend_requested = false;
            }
            inner.resend_expired();
        }
        debug!(worker = %inner.local, "delivery.timer.exit");
    }

    /// Worker this coordinator sends as.
    pub fn local(&self) -> WorkerId {
        self.inner.local
    }

    /// Sends `request` to `destination` and returns its id.
    ///
    /// Never waits for the acknowledgement. Failures to reach the
    /// destination are retried in the background and surface from
    /// [`Self::await_all`].
    pub fn send<G: GraphTypes>(&self, destination: WorkerId, request: &Request<G>) -> Result<RequestId> {
        let payload = request.encode_payload()?;
        self.send_payload(destination, request.request_type(), payload)
    }

    /// Sends an already encoded request body.
    pub fn send_payload(
        &self,
        destination: WorkerId,
        request_type: RequestType,
        payload: Bytes,
    ) -> Result<RequestId> {
        self.inner.send(destination, request_type, payload)
    }

    /// Blocks until every pending request is acknowledged or has failed.
    ///
    /// Returns [`GraphError::DeliveryFailed`] listing every request that
    /// failed since the previous call.
    pub fn await_all(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while !state.pending.is_empty() && !state.shutdown {
            self.inner.settled.wait(&mut state);
        }
        if state.shutdown && !state.pending.is_empty() {
            return Err(GraphError::Shutdown("delivery coordinator"));
        }
        let failures = std::mem::take(&mut state.failures);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(GraphError::DeliveryFailed(failures))
        }
    }

    /// Resends every pending request that timed out or lost its connection.
    ///
    /// Called by the timer every `waiting_interval`; exposed so callers with
    /// a manual clock can drive it. Returns the number of frames resent.
    pub fn resend_expired(&self) -> usize {
        self.inner.resend_expired()
    }

    /// Number of requests not yet acknowledged or failed.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Id the next request to `destination` will carry.
    pub fn next_request_id(&self, destination: WorkerId) -> RequestId {
        self.inner
            .state
            .lock()
            .peers
            .get(&destination)
            .map(|peer| peer.next_request_id)
            .unwrap_or_default()
    }

    /// Stops the timer and closes every connection.
    pub fn shutdown(&self) {
        let connections: Vec<ConnectionId> = {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state
                .peers
                .values_mut()
                .filter_map(|peer| peer.connection.take())
                .collect()
        };
        self.inner.wakeup.notify_all();
        self.inner.settled.notify_all();
        if let Some(handle) = self.timer.lock().take() {
            if handle.join().is_err() {
                warn!(worker = %self.inner.local, "delivery.timer.panicked");
            }
        }
        for connection in connections {
            self.inner.transport.close(connection);
        }
        debug!(worker = %self.inner.local, "delivery.shutdown");
    }
}

impl Drop for DeliveryCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn send(&self, destination: WorkerId, request_type: RequestType, payload: Bytes) -> Result<RequestId> {
        let (request_id, frame) = {
            let mut state = self.state.lock();
            if state.shutdown {
                return Err(GraphError::Shutdown("delivery coordinator"));
            }
            let peer = state.peers.entry(destination).or_default();
            let request_id = peer.next_request_id;
            let frame = RequestFrame {
                sender: self.local,
                request_id,
                request_type,
                payload,
            }
            .encode()?;
            peer.next_request_id = request_id.next();
            state.pending.insert(
                (destination, request_id),
                PendingRequest {
                    frame: frame.clone(),
                    dispatched_at: self.clock.now(),
                    attempts: 1,
                    route: Route::Dispatching,
                },
            );
            (request_id, frame)
        };
        self.metrics.request_sent();
        debug!(
            destination = %destination,
            request_id = %request_id,
            request_type = ?request_type,
            bytes = frame.len(),
            "delivery.send"
        );
        match self.connection_for(destination) {
            Ok(connection) => self.transmit(destination, request_id, connection, frame),
            Err(_) => self.mark_unsent(destination, &[request_id]),
        }
        Ok(request_id)
    }

    fn resend_expired(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.config.request_timeout;
        let max_attempts = self.config.max_request_attempts;
        let mut batches: HashMap<WorkerId, Vec<(RequestId, Bytes)>> = HashMap::new();
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return 0;
            }
            let ClientState {
                peers,
                pending,
                failures,
                ..
            } = &mut *state;
            let before = failures.len();
            pending.retain(|&(destination, request_id), request| {
                let live = peers.get(&destination).and_then(|peer| peer.connection);
                let lost = match request.route {
                    Route::Dispatching => false,
                    Route::Sent(connection) => live != Some(connection),
                    Route::Unsent => true,
                };
                let expired = now.saturating_duration_since(request.dispatched_at) > timeout;
                if !lost && !expired {
                    return true;
                }
                if request.attempts >= max_attempts {
                    warn!(
                        destination = %destination,
                        request_id = %request_id,
                        attempts = request.attempts,
                        "delivery.request.retries_exhausted"
                    );
                    failures.push(DeliveryFailure {
                        destination,
                        request_id,
                        reason: FailureReason::RetriesExhausted {
                            attempts: request.attempts,
                        },
                    });
                    return false;
                }
                request.attempts += 1;
                request.dispatched_at = now;
                request.route = Route::Dispatching;
                batches
                    .entry(destination)
                    .or_default()
                    .push((request_id, request.frame.clone()));
                true
            });
            let failed = failures.len() - before;
            if failed > 0 {
                for _ in 0..failed {
                    self.metrics.request_failed();
                }
                self.settled.notify_all();
            }
        }

        let mut resent = 0;
        for (destination, frames) in batches {
            let Ok(connection) = self.connection_for(destination) else {
                let ids: Vec<RequestId> = frames.iter().map(|(id, _)| *id).collect();
                self.mark_unsent(destination, &ids);
                continue;
            };
            for (request_id, frame) in frames {
                self.metrics.request_resent();
                debug!(
                    destination = %destination,
                    request_id = %request_id,
                    connection = %connection,
                    "delivery.resend"
                );
                self.transmit(destination, request_id, connection, frame);
                resent += 1;
            }
        }
        resent
    }

    /// Live connection to `destination`, connecting if there is none.
    fn connection_for(&self, destination: WorkerId) -> Result<ConnectionId> {
        {
            let state = self.state.lock();
            if state.shutdown {
                return Err(GraphError::Shutdown("delivery coordinator"));
            }
            if let Some(connection) = state.peers.get(&destination).and_then(|p| p.connection) {
                return Ok(connection);
            }
        }
        let handler: Arc<dyn ResponseHandler> = Arc::new(ResponseRouter {
            inner: self.me.clone(),
        });
        match self.transport.connect(destination, handler) {
            Ok(connection) => {
                let mut state = self.state.lock();
                let peer = state.peers.entry(destination).or_default();
                if let Some(existing) = peer.connection {
                    drop(state);
                    self.transport.close(connection);
                    return Ok(existing);
                }
                peer.connection = Some(connection);
                peer.reconnect_failures = 0;
                drop(state);
                self.metrics.connection_opened();
                debug!(destination = %destination, connection = %connection, "delivery.connect");
                Ok(connection)
            }
            Err(err) => {
                self.record_connect_failure(destination, &err);
                Err(err)
            }
        }
    }

    fn record_connect_failure(&self, destination: WorkerId, err: &GraphError) {
        let mut state = self.state.lock();
        let peer = state.peers.entry(destination).or_default();
        peer.reconnect_failures += 1;
        let reconnects = peer.reconnect_failures;
        debug!(
            destination = %destination,
            reconnects,
            error = %err,
            "delivery.connect.failed"
        );
        if reconnects < self.config.max_reconnect_attempts.max(1) {
            return;
        }
        let ClientState {
            pending, failures, ..
        } = &mut *state;
        let before = failures.len();
        pending.retain(|&(to, request_id), _| {
            if to != destination {
                return true;
            }
            failures.push(DeliveryFailure {
                destination,
                request_id,
                reason: FailureReason::Unreachable { reconnects },
            });
            false
        });
        let failed = failures.len() - before;
        if failed > 0 {
            warn!(
                destination = %destination,
                reconnects,
                failed,
                "delivery.destination.unreachable"
            );
            for _ in 0..failed {
                self.metrics.request_failed();
            }
            self.settled.notify_all();
        }
    }

    fn mark_unsent(&self, destination: WorkerId, request_ids: &[RequestId]) {
        let mut state = self.state.lock();
        for &request_id in request_ids {
            if let Some(request) = state.pending.get_mut(&(destination, request_id)) {
                request.route = Route::Unsent;
            }
        }
    }

    fn transmit(&self, destination: WorkerId, request_id: RequestId, connection: ConnectionId, frame: Bytes) {
        match self.transport.send(connection, frame) {
            Ok(()) => {
                let mut state = self.state.lock();
                if let Some(request) = state.pending.get_mut(&(destination, request_id)) {
                    request.route = Route::Sent(connection);
                }
                // The connection may have died while the frame was written.
                let live = state.peers.get(&destination).and_then(|peer| peer.connection);
                if live != Some(connection) {
                    state.resend_requested = true;
                    drop(state);
                    self.wakeup.notify_one();
                }
            }
            Err(err) => {
                debug!(
                    destination = %destination,
                    request_id = %request_id,
                    connection = %connection,
                    error = %err,
                    "delivery.transmit.failed"
                );
                self.forget_connection(connection);
                self.transport.close(connection);
                let mut state = self.state.lock();
                if let Some(request) = state.pending.get_mut(&(destination, request_id)) {
                    request.route = Route::Unsent;
                }
                state.resend_requested = true;
                drop(state);
                self.wakeup.notify_one();
            }
        }
    }

    /// Clears `connection` from its peer; returns whether it was current.
    fn forget_connection(&self, connection: ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(peer) = state
            .peers
            .values_mut()
            .find(|peer| peer.connection == Some(connection))
        else {
            return false;
        };
        peer.connection = None;
        drop(state);
        self.metrics.connection_lost();
        true
    }

    fn on_response(&self, connection: ConnectionId, frame: Bytes) {
        let response = match Frame::decode(&frame) {
            Ok(Frame::Response(response)) => response,
            Ok(Frame::Request(_)) => {
                warn!(connection = %connection, "delivery.response.unexpected_request");
                return;
            }
            Err(err) => {
                warn!(connection = %connection, error = %err, "delivery.response.undecodable");
                return;
            }
        };
        let key = (response.responder(), response.request_id());
        let mut state = self.state.lock();
        let Some(request) = state.pending.remove(&key) else {
            debug!(
                responder = %key.0,
                request_id = %key.1,
                "delivery.response.stale"
            );
            return;
        };
        match response {
            ResponseFrame::Ack { .. } => {
                self.metrics.ack_received();
                debug!(
                    destination = %key.0,
                    request_id = %key.1,
                    attempts = request.attempts,
                    "delivery.ack"
                );
            }
            ResponseFrame::Failed { reason, .. } => {
                self.metrics.request_failed();
                warn!(
                    destination = %key.0,
                    request_id = %key.1,
                    reason = %reason,
                    "delivery.request.rejected"
                );
                state.failures.push(DeliveryFailure {
                    destination: key.0,
                    request_id: key.1,
                    reason: FailureReason::Rejected(reason),
                });
            }
        }
        drop(state);
        self.settled.notify_all();
    }

    fn on_closed(&self, connection: ConnectionId) {
        if self.forget_connection(connection) {
            debug!(connection = %connection, "delivery.connection.closed");
            self.state.lock().resend_requested = true;
            self.wakeup.notify_one();
        }
    }
}
