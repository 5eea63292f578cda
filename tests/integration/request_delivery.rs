#![allow(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use bsp_graph::comm::{
    CounterMetrics, DeliveryCoordinator, FaultAction, FirstRequestFault, MemNetwork, NoopMetrics,
    RandomFaults, Request, RequestServer, RequestType, ServerData, VertexIdMessages,
};
use bsp_graph::config::{DeliveryConfig, PartitionConfig};
use bsp_graph::error::{FailureReason, GraphError, Result};
use bsp_graph::types::{GraphTypes, PartitionId, SystemClock, WorkerId};

struct IntMessages;

impl GraphTypes for IntMessages {
    type Id = i64;
    type Value = i64;
    type EdgeValue = i64;
    type Message = i64;
}

const SENDER: WorkerId = WorkerId(0);
const RECEIVER: WorkerId = WorkerId(1);

fn delivery(timeout_ms: u64, interval_ms: u64) -> DeliveryConfig {
    DeliveryConfig {
        request_timeout: Duration::from_millis(timeout_ms),
        waiting_interval: Duration::from_millis(interval_ms),
        max_request_attempts: 10,
        max_reconnect_attempts: 3,
    }
}

struct Cluster {
    network: Arc<MemNetwork>,
    server: Arc<RequestServer<IntMessages>>,
    server_metrics: Arc<CounterMetrics>,
}

impl Cluster {
    fn new(network: Arc<MemNetwork>) -> Self {
        let data = Arc::new(ServerData::new(PartitionConfig::default()));
        let server_metrics = Arc::new(CounterMetrics::default());
        let server = Arc::new(RequestServer::with_metrics(
            RECEIVER,
            data,
            server_metrics.clone(),
        ));
        network.register(RECEIVER, server.clone());
        Self {
            network,
            server,
            server_metrics,
        }
    }

    fn coordinator(&self, worker: WorkerId, config: DeliveryConfig) -> DeliveryCoordinator {
        DeliveryCoordinator::new(worker, Arc::new(self.network.transport()), config)
    }

    /// Sum of destination ids and sum of every message value received.
    fn sums(&self) -> (i64, i64) {
        let messages = self.server.data().messages();
        let destinations = messages.destination_vertices();
        let key_sum = destinations.iter().sum();
        let message_sum = destinations
            .iter()
            .flat_map(|id| messages.vertex_messages(id))
            .sum();
        (key_sum, message_sum)
    }
}

/// Vertex `i` in 1..=6 receives the messages `0..i`.
fn six_vertex_request() -> Request<IntMessages> {
    let mut messages = VertexIdMessages::new();
    for vertex in 1..=6i64 {
        for message in 0..vertex {
            messages.add(&vertex, &message);
        }
    }
    Request::SendWorkerMessages(vec![(PartitionId(0), messages)])
}

fn send_twice_and_check(cluster: &Cluster, config: DeliveryConfig) -> Result<()> {
    let coordinator = cluster.coordinator(SENDER, config);
    coordinator.send(RECEIVER, &six_vertex_request())?;
    coordinator.send(RECEIVER, &six_vertex_request())?;
    coordinator.await_all()?;

    assert_eq!(cluster.sums(), (21, 70));
    assert_eq!(cluster.server.ledger().applied(SENDER), 2);
    assert_eq!(coordinator.pending_count(), 0);
    Ok(())
}

#[test]
fn messages_are_delivered_once() -> Result<()> {
    let cluster = Cluster::new(MemNetwork::new());
    send_twice_and_check(&cluster, delivery(500, 50))
}

#[test]
fn lost_response_is_resent_and_not_reapplied() -> Result<()> {
    let fault = Arc::new(FirstRequestFault::new(FaultAction::DropResponse));
    let cluster = Cluster::new(MemNetwork::with_injector(fault.clone()));
    send_twice_and_check(&cluster, delivery(200, 50))?;

    assert!(fault.fired());
    assert_eq!(CounterMetrics::get(&cluster.server_metrics.requests_applied), 2);
    assert_eq!(CounterMetrics::get(&cluster.server_metrics.duplicate_requests), 1);
    Ok(())
}

#[test]
fn closed_connection_is_reopened_and_request_resent() -> Result<()> {
    let fault = Arc::new(FirstRequestFault::new(FaultAction::CloseConnection));
    let cluster = Cluster::new(MemNetwork::with_injector(fault.clone()));
    send_twice_and_check(&cluster, delivery(200, 50))?;

    assert!(fault.fired());
    assert_eq!(CounterMetrics::get(&cluster.server_metrics.duplicate_requests), 0);
    Ok(())
}

#[test]
fn duplicated_request_is_applied_once() -> Result<()> {
    let fault = Arc::new(FirstRequestFault::new(FaultAction::Duplicate));
    let cluster = Cluster::new(MemNetwork::with_injector(fault));
    send_twice_and_check(&cluster, delivery(500, 50))?;

    assert_eq!(CounterMetrics::get(&cluster.server_metrics.duplicate_requests), 1);
    Ok(())
}

#[test]
fn lost_response_costs_about_one_timeout() -> Result<()> {
    let timeout = Duration::from_millis(300);
    let interval = Duration::from_millis(50);
    let cluster = Cluster::new(MemNetwork::with_injector(Arc::new(FirstRequestFault::new(
        FaultAction::DropResponse,
    ))));
    let coordinator = cluster.coordinator(SENDER, delivery(300, 50));

    let started = Instant::now();
    coordinator.send(RECEIVER, &six_vertex_request())?;
    coordinator.await_all()?;
    let elapsed = started.elapsed();

    assert!(elapsed >= timeout, "resent after {elapsed:?}, before the timeout");
    assert!(
        elapsed < timeout + interval + Duration::from_millis(700),
        "resend took {elapsed:?}"
    );
    Ok(())
}

#[test]
fn connection_loss_triggers_resend_before_timeout() -> Result<()> {
    let cluster = Cluster::new(MemNetwork::with_injector(Arc::new(FirstRequestFault::new(
        FaultAction::CloseConnection,
    ))));
    let coordinator = cluster.coordinator(SENDER, delivery(30_000, 30_000));

    let started = Instant::now();
    coordinator.send(RECEIVER, &six_vertex_request())?;
    coordinator.await_all()?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(cluster.sums(), (21, 35));
    Ok(())
}

#[test]
fn request_ids_are_scoped_per_sender() -> Result<()> {
    let cluster = Cluster::new(MemNetwork::new());
    let first = cluster.coordinator(WorkerId(0), delivery(500, 50));
    let second = cluster.coordinator(WorkerId(2), delivery(500, 50));

    let a = first.send(RECEIVER, &six_vertex_request())?;
    let b = second.send(RECEIVER, &six_vertex_request())?;
    assert_eq!(a, b, "both senders start from the same id");
    first.await_all()?;
    second.await_all()?;

    assert_eq!(cluster.sums(), (21, 70));
    Ok(())
}

#[test]
fn unreachable_worker_fails_permanently() {
    let cluster = Cluster::new(MemNetwork::new());
    let coordinator = cluster.coordinator(SENDER, delivery(100, 20));

    coordinator
        .send(WorkerId(7), &six_vertex_request())
        .expect("send never waits for the network");
    match coordinator.await_all() {
        Err(GraphError::DeliveryFailed(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].destination, WorkerId(7));
            assert_eq!(failures[0].reason, FailureReason::Unreachable { reconnects: 3 });
        }
        other => panic!("expected a delivery failure, got {other:?}"),
    }
}

#[test]
fn rejected_request_is_reported_and_not_recorded() {
    let cluster = Cluster::new(MemNetwork::new());
    let coordinator = cluster.coordinator(SENDER, delivery(500, 50));

    let id = coordinator
        .send_payload(RECEIVER, RequestType::SendPartition, Bytes::from_static(b"garbage"))
        .expect("queued");
    match coordinator.await_all() {
        Err(GraphError::DeliveryFailed(failures)) => {
            assert_eq!(failures[0].request_id, id);
            assert!(matches!(failures[0].reason, FailureReason::Rejected(_)));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert!(!cluster.server.ledger().contains(SENDER, id));

    coordinator
        .send(RECEIVER, &six_vertex_request())
        .expect("queued");
    coordinator.await_all().expect("later requests still succeed");
    assert_eq!(cluster.sums(), (21, 35));
}

#[test]
fn random_faults_never_lose_or_repeat_a_request() -> Result<()> {
    bsp_graph::logging::try_init_from_env("warn");
    let injector = Arc::new(RandomFaults::new(0x5eed, 0.2, 0.1, 0.1));
    let cluster = Cluster::new(MemNetwork::with_injector(injector));
    let client_metrics = Arc::new(CounterMetrics::default());
    let coordinator = DeliveryCoordinator::with_instrumentation(
        SENDER,
        Arc::new(cluster.network.transport()),
        DeliveryConfig {
            max_request_attempts: 25,
            ..delivery(100, 20)
        },
        Arc::new(SystemClock),
        client_metrics.clone(),
    );

    for vertex in 0..50i64 {
        let mut messages = VertexIdMessages::new();
        messages.add(&vertex, &1);
        coordinator.send(
            RECEIVER,
            &Request::<IntMessages>::SendWorkerMessages(vec![(PartitionId(0), messages)]),
        )?;
    }
    coordinator.await_all()?;

    let messages = cluster.server.data().messages();
    assert_eq!(messages.message_count(), 50);
    for vertex in 0..50i64 {
        assert_eq!(messages.vertex_messages(&vertex), vec![1]);
    }
    assert_eq!(cluster.server.ledger().applied(SENDER), 50);
    assert_eq!(CounterMetrics::get(&client_metrics.acks_received), 50);
    assert_eq!(CounterMetrics::get(&client_metrics.requests_failed), 0);
    Ok(())
}

#[test]
fn shutdown_abandons_pending_requests() {
    let network = MemNetwork::new();
    let coordinator = DeliveryCoordinator::with_instrumentation(
        SENDER,
        Arc::new(network.transport()),
        delivery(60_000, 60_000),
        Arc::new(SystemClock),
        Arc::new(NoopMetrics),
    );
    coordinator
        .send_payload(WorkerId(3), RequestType::SendPartition, Bytes::new())
        .expect("queued");
    coordinator.shutdown();
    assert!(matches!(coordinator.await_all(), Err(GraphError::Shutdown(_))));
}
