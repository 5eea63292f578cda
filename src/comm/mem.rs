//! In-process transport for tests, compiled with the `testing` feature.
//!
//! This is NOT a production transport. [`MemNetwork`] routes frames between
//! coordinators and request servers living in the same process. Each
//! connection owns a thread that hands its frames to the server in order,
//! and a pluggable [`FaultInjector`] decides per request whether the
//! response is delivered, dropped, duplicated, or the connection is closed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::types::{ConnectionId, WorkerId};

use super::envelope::{Frame, RequestFrame};
use super::transport::{RequestHandler, ResponseHandler, Transport};

/// What the network does with one request frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultAction {
    /// Apply and answer normally.
    Deliver,
    /// Apply, then lose the response.
    DropResponse,
    /// Close the connection before the request reaches the server.
    CloseConnection,
    /// Deliver the request twice and answer both copies.
    Duplicate,
}

/// Chooses a [`FaultAction`] for each request crossing a [`MemNetwork`].
pub trait FaultInjector: Send + Sync {
    /// Decides the fate of `frame` travelling to `destination`.
    fn on_request(&self, destination: WorkerId, frame: &RequestFrame) -> FaultAction;
}

/// Delivers everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn on_request(&self, _destination: WorkerId, _frame: &RequestFrame) -> FaultAction {
        FaultAction::Deliver
    }
}

/// Applies one action to the first request only.
#[derive(Debug)]
pub struct FirstRequestFault {
    action: FaultAction,
    fired: AtomicBool,
}

impl FirstRequestFault {
    /// Creates an injector that applies `action` once.
    pub fn new(action: FaultAction) -> Self {
        Self {
            action,
            fired: AtomicBool::new(false),
        }
    }

    /// Whether the action has been applied.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl FaultInjector for FirstRequestFault {
    fn on_request(&self, _destination: WorkerId, _frame: &RequestFrame) -> FaultAction {
        if self.fired.swap(true, Ordering::SeqCst) {
            FaultAction::Deliver
        } else {
            self.action
        }
    }
}

/// Picks faults at random with fixed probabilities from a seeded generator.
#[derive(Debug)]
pub struct RandomFaults {
    rng: Mutex<StdRng>,
    drop_response: f64,
    close_connection: f64,
    duplicate: f64,
}

impl RandomFaults {
    /// Creates an injector; probabilities are per request and should sum to
    /// at most one.
    pub fn new(seed: u64, drop_response: f64, close_connection: f64, duplicate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            drop_response,
            close_connection,
            duplicate,
        }
    }
}

impl FaultInjector for RandomFaults {
    fn on_request(&self, _destination: WorkerId, _frame: &RequestFrame) -> FaultAction {
        let roll: f64 = self.rng.lock().gen();
        if roll < self.drop_response {
            FaultAction::DropResponse
        } else if roll < self.drop_response + self.close_connection {
            FaultAction::CloseConnection
        } else if roll < self.drop_response + self.close_connection + self.duplicate {
            FaultAction::Duplicate
        } else {
            FaultAction::Deliver
        }
    }
}

/// Registry of in-process request servers.
pub struct MemNetwork {
    servers: RwLock<HashMap<WorkerId, Arc<dyn RequestHandler>>>,
    unreachable: RwLock<HashSet<WorkerId>>,
    injector: RwLock<Arc<dyn FaultInjector>>,
    next_connection: AtomicU64,
}

impl MemNetwork {
    /// Creates a network without faults.
    pub fn new() -> Arc<Self> {
        Self::with_injector(Arc::new(NoFaults))
    }

    /// Creates a network that consults `injector` for every request.
    pub fn with_injector(injector: Arc<dyn FaultInjector>) -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            injector: RwLock::new(injector),
            next_connection: AtomicU64::new(1),
        })
    }

    /// Replaces the fault injector for subsequent requests.
    pub fn set_injector(&self, injector: Arc<dyn FaultInjector>) {
        *self.injector.write() = injector;
    }

    /// Makes `worker` reachable through `handler`.
    pub fn register(&self, worker: WorkerId, handler: Arc<dyn RequestHandler>) {
        self.servers.write().insert(worker, handler);
    }

    /// Removes the server of `worker`; new connections to it fail.
    pub fn deregister(&self, worker: WorkerId) {
        self.servers.write().remove(&worker);
    }

    /// Lets new connections to `worker` succeed or fail. Open connections
    /// are unaffected.
    pub fn set_reachable(&self, worker: WorkerId, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        if reachable {
            unreachable.remove(&worker);
        } else {
            unreachable.insert(worker);
        }
    }

    /// Creates a transport attached to this network.
    pub fn transport(self: &Arc<Self>) -> MemTransport {
        MemTransport {
            network: Arc::clone(self),
            links: Mutex::new(HashMap::new()),
        }
    }

    fn server(&self, worker: WorkerId) -> Result<Arc<dyn RequestHandler>> {
        if self.unreachable.read().contains(&worker) {
            return Err(GraphError::Unreachable(worker));
        }
        self.servers
            .read()
            .get(&worker)
            .cloned()
            .ok_or(GraphError::Unreachable(worker))
    }

    fn injector(&self) -> Arc<dyn FaultInjector> {
        Arc::clone(&self.injector.read())
    }
}

struct Link {
    tx: mpsc::Sender<Bytes>,
    closed: Arc<AtomicBool>,
}

/// Client endpoint of a [`MemNetwork`].
pub struct MemTransport {
    network: Arc<MemNetwork>,
    links: Mutex<HashMap<ConnectionId, Link>>,
}

impl MemTransport {
    /// Number of connections this transport still considers open.
    pub fn open_connections(&self) -> usize {
        self.links
            .lock()
            .values()
            .filter(|link| !link.closed.load(Ordering::SeqCst))
            .count()
    }
}

impl Transport for MemTransport {
    fn connect(&self, peer: WorkerId, handler: Arc<dyn ResponseHandler>) -> Result<ConnectionId> {
        let server = self.network.server(peer)?;
        let connection = ConnectionId(self.network.next_connection.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let link = LinkWorker {
            connection,
            peer,
            server,
            handler,
            network: Arc::clone(&self.network),
            closed: Arc::clone(&closed),
        };
        thread::Builder::new()
            .name(format!("mem-{connection}"))
            .spawn(move || link.run(rx))?;
        self.links.lock().insert(connection, Link { tx, closed });
        debug!(peer = %peer, connection = %connection, "mem.connect");
        Ok(connection)
    }

    fn send(&self, connection: ConnectionId, frame: Bytes) -> Result<()> {
        let mut links = self.links.lock();
        let Some(link) = links.get(&connection) else {
            return Err(GraphError::ConnectionClosed);
        };
        if link.closed.load(Ordering::SeqCst) || link.tx.send(frame).is_err() {
            links.remove(&connection);
            return Err(GraphError::ConnectionClosed);
        }
        Ok(())
    }

    fn close(&self, connection: ConnectionId) {
        if self.links.lock().remove(&connection).is_some() {
            debug!(connection = %connection, "mem.close");
        }
    }
}

impl Drop for MemTransport {
    fn drop(&mut self) {
        self.links.lock().clear();
    }
}

struct LinkWorker {
    connection: ConnectionId,
    peer: WorkerId,
    server: Arc<dyn RequestHandler>,
    handler: Arc<dyn ResponseHandler>,
    network: Arc<MemNetwork>,
    closed: Arc<AtomicBool>,
}

impl LinkWorker {
    fn run(self, rx: mpsc::Receiver<Bytes>) {
        while let Ok(frame) = rx.recv() {
            let action = match Frame::decode(&frame) {
                Ok(Frame::Request(request)) => self.network.injector().on_request(self.peer, &request),
                _ => FaultAction::Deliver,
            };
            match action {
                FaultAction::Deliver => self.serve(frame),
                FaultAction::DropResponse => {
                    let dropped = self.server.handle_request(frame);
                    debug!(
                        connection = %self.connection,
                        had_response = dropped.is_some(),
                        "mem.fault.drop_response"
                    );
                }
                FaultAction::CloseConnection => {
                    self.closed.store(true, Ordering::SeqCst);
                    debug!(connection = %self.connection, "mem.fault.close_connection");
                    self.handler.on_closed(self.connection);
                    return;
                }
                FaultAction::Duplicate => {
                    debug!(connection = %self.connection, "mem.fault.duplicate");
                    self.serve(frame.clone());
                    self.serve(frame);
                }
            }
        }
    }

    fn serve(&self, frame: Bytes) {
        if let Some(response) = self.server.handle_request(frame) {
            self.handler.on_response(self.connection, response);
        }
    }
}
