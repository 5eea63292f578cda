#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use bsp_graph::comm::{
    DeliveryCoordinator, FaultAction, FirstRequestFault, MemNetwork, Request, RequestServer,
    ServerData, VertexIdMessages,
};
use bsp_graph::config::{Config, DeliveryConfig, PartitionConfig};
use bsp_graph::error::Result;
use bsp_graph::graph::{EdgeStrategy, Vertex};
use bsp_graph::storage::{Partition, PartitionKind, PartitionStore};
use bsp_graph::types::{GraphTypes, PartitionId, WorkerId};

struct Labels;

impl GraphTypes for Labels {
    type Id = i64;
    type Value = String;
    type EdgeValue = ();
    type Message = String;
}

const SOURCE: WorkerId = WorkerId(10);
const TARGET: WorkerId = WorkerId(20);

fn delivery() -> DeliveryConfig {
    DeliveryConfig {
        request_timeout: Duration::from_millis(200),
        waiting_interval: Duration::from_millis(25),
        ..Config::testing().delivery()
    }
}

fn ring(id: u32, ids: std::ops::Range<i64>, config: &PartitionConfig) -> Result<Partition<Labels>> {
    let mut partition = Partition::new(PartitionId(id), config);
    for vid in ids.clone() {
        let mut vertex = Vertex::new(vid, format!("v{vid}"), EdgeStrategy::Hashed);
        vertex.add_edge(if vid + 1 == ids.end { ids.start } else { vid + 1 }, ());
        partition.put_vertex(&vertex)?;
    }
    Ok(partition)
}

fn target_server(
    network: &Arc<MemNetwork>,
    kind: PartitionKind,
) -> Arc<RequestServer<Labels>> {
    let config = PartitionConfig {
        partition_kind: kind,
        ..Config::testing().partition()
    };
    let server = Arc::new(RequestServer::new(TARGET, Arc::new(ServerData::new(config))));
    network.register(TARGET, server.clone());
    server
}

#[test]
fn partition_moves_between_workers() -> Result<()> {
    for kind in [PartitionKind::ByteArray, PartitionKind::Simple] {
        let network = MemNetwork::new();
        let server = target_server(&network, kind);
        let coordinator = DeliveryCoordinator::new(SOURCE, Arc::new(network.transport()), delivery());

        let local = ring(4, 0..20, &Config::testing().partition())?;
        coordinator.send(TARGET, &Request::send_partition(&local)?)?;
        coordinator.await_all()?;

        let data = server.data();
        assert_eq!(data.partition_ids(), vec![PartitionId(4)]);
        let edges = data
            .with_partition(PartitionId(4), |partition| -> Result<u64> {
                assert_eq!(partition.kind(), kind);
                let vertex = partition.get_vertex(&19)?.expect("moved");
                assert_eq!(vertex.value(), "v19");
                assert_eq!(vertex.edge_value(&0), Some(()));
                partition.edge_count()
            })
            .expect("partition present")?;
        assert_eq!(edges, 20);
    }
    Ok(())
}

#[test]
fn received_partition_merges_into_existing_one() -> Result<()> {
    let network = MemNetwork::with_injector(Arc::new(FirstRequestFault::new(
        FaultAction::DropResponse,
    )));
    let server = target_server(&network, PartitionKind::ByteArray);
    let config = *server.data().partition_config();
    server.data().add_partition(ring(1, 0..10, &config)?)?;

    let coordinator = DeliveryCoordinator::new(SOURCE, Arc::new(network.transport()), delivery());
    let mut incoming = ring(1, 5..15, &config)?;
    let mut replaced = Vertex::new(5, "replaced".to_string(), EdgeStrategy::Hashed);
    replaced.add_edge(0, ());
    incoming.put_vertex(&replaced)?;
    coordinator.send(TARGET, &Request::send_partition(&incoming)?)?;
    coordinator.await_all()?;

    assert_eq!(server.data().vertex_count(), 15);
    let value = server
        .data()
        .with_partition(PartitionId(1), |p| -> Result<Option<String>> {
            Ok(p.get_vertex(&5)?.map(|v| v.value().clone()))
        })
        .expect("partition present")?;
    assert_eq!(value.as_deref(), Some("replaced"));
    assert_eq!(server.ledger().applied(SOURCE), 1);
    Ok(())
}

#[test]
fn messages_and_partitions_share_one_sequence() -> Result<()> {
    let network = MemNetwork::new();
    let server = target_server(&network, PartitionKind::Simple);
    let coordinator = DeliveryCoordinator::new(SOURCE, Arc::new(network.transport()), delivery());

    let mut messages = VertexIdMessages::new();
    messages.add(&3, &"hello".to_string());
    let first = coordinator.send(
        TARGET,
        &Request::<Labels>::SendWorkerMessages(vec![(PartitionId(0), messages)]),
    )?;
    let second = coordinator.send(
        TARGET,
        &Request::send_partition(&ring(0, 0..4, &Config::testing().partition())?)?,
    )?;
    assert_eq!(second, first.next());
    coordinator.await_all()?;

    let data = server.data();
    assert_eq!(data.messages().vertex_messages(&3), vec!["hello".to_string()]);
    assert_eq!(data.vertex_count(), 4);
    let removed = data.remove_partition(PartitionId(0)).expect("present");
    assert_eq!(removed.vertex_count(), 4);
    assert!(data.partition_ids().is_empty());
    Ok(())
}
