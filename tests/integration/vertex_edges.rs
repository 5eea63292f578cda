#![allow(missing_docs)]

use bsp_graph::codec::{self, Codec};
use bsp_graph::config::{Config, PartitionConfig};
use bsp_graph::error::Result;
use bsp_graph::graph::{EdgeStrategy, Vertex};
use bsp_graph::storage::{Partition, PartitionKind, PartitionStore};
use bsp_graph::types::{GraphTypes, PartitionId};

const STRATEGIES: [EdgeStrategy; 3] = [EdgeStrategy::Hashed, EdgeStrategy::Sorted, EdgeStrategy::Lazy];

struct Doubles;

impl GraphTypes for Doubles {
    type Id = i32;
    type Value = f64;
    type EdgeValue = f64;
    type Message = f64;
}

type DoubleVertex = Vertex<i32, f64, f64>;

fn thousand_edges(strategy: EdgeStrategy) -> DoubleVertex {
    let mut vertex = Vertex::new(0, 0.0, strategy);
    for target in 0..1000 {
        assert!(vertex.add_edge(target, f64::from(target) * 2.0));
    }
    vertex
}

fn through_codec(vertex: &DoubleVertex, strategy: EdgeStrategy) -> Result<DoubleVertex> {
    let bytes = codec::to_bytes_with_size(vertex)?;
    let mut decoded = Vertex::new(-1, -1.0, strategy);
    codec::decode_into_with_size(&bytes, &mut decoded)?;
    Ok(decoded)
}

#[test]
fn thousand_edges_keep_their_values() -> Result<()> {
    for strategy in STRATEGIES {
        let vertex = thousand_edges(strategy);
        assert_eq!(vertex.num_edges(), 1000);
        for decode_as in STRATEGIES {
            let decoded = through_codec(&vertex, decode_as)?;
            assert_eq!(decoded.num_edges(), 1000, "{strategy:?} -> {decode_as:?}");
            for edge in decoded.iter_edges() {
                assert_eq!(edge.value, f64::from(edge.target) * 2.0);
            }
            assert_eq!(decoded, vertex);
        }
    }
    Ok(())
}

#[test]
fn removing_an_edge_returns_its_value() -> Result<()> {
    for strategy in STRATEGIES {
        let mut vertex = through_codec(&thousand_edges(strategy), strategy)?;
        assert_eq!(vertex.remove_edge(&500), Some(1000.0), "{strategy:?}");
        assert_eq!(vertex.remove_edge(&500), None);
        assert_eq!(vertex.remove_edge(&5000), None);
        assert_eq!(vertex.num_edges(), 999);
        assert_eq!(vertex.edge_value(&499), Some(998.0));

        let reread = through_codec(&vertex, strategy)?;
        assert_eq!(reread.num_edges(), 999);
        assert_eq!(reread.edge_value(&500), None);
    }
    Ok(())
}

#[test]
fn adding_an_existing_target_overwrites_its_value() {
    for strategy in STRATEGIES {
        let mut vertex = thousand_edges(strategy);
        for target in 0..600 {
            assert!(!vertex.add_edge(target, 3.0), "{strategy:?} kept a duplicate");
        }
        assert_eq!(vertex.num_edges(), 1000);
        let threes = vertex.iter_edges().filter(|edge| edge.value == 3.0).count();
        assert_eq!(threes, 600);
        assert_eq!(vertex.edge_value(&999), Some(1998.0));
    }
}

#[test]
fn halted_flag_and_value_survive_a_partition() -> Result<()> {
    for strategy in STRATEGIES {
        for kind in [PartitionKind::ByteArray, PartitionKind::Simple] {
            let config = PartitionConfig {
                edge_strategy: strategy,
                partition_kind: kind,
                ..Config::testing().partition()
            };
            let mut partition = Partition::<Doubles>::new(PartitionId(0), &config);
            let mut vertex = thousand_edges(strategy);
            vertex.set_value(4.25);
            vertex.vote_to_halt();
            partition.put_vertex(&vertex)?;

            let stored = partition.get_vertex(&0)?.expect("stored");
            assert!(stored.is_halted());
            assert_eq!(*stored.value(), 4.25);
            assert_eq!(stored.edges().strategy(), strategy);
            assert_eq!(stored.num_edges(), 1000);
            assert_eq!(partition.edge_count()?, 1000);
        }
    }
    Ok(())
}

#[test]
fn vertex_encoding_is_big_endian_and_size_prefixed() -> Result<()> {
    let mut vertex: Vertex<i32, i32, i32> = Vertex::new(1, 2, EdgeStrategy::Sorted);
    vertex.add_edge(3, 4);
    let bytes = codec::to_bytes_with_size(&vertex)?;
    assert_eq!(
        bytes,
        [
            0u8, 0, 0, 25, // size prefix, counting itself
            0, 0, 0, 1, // id
            0, 0, 0, 2, // value
            0, 0, 0, 1, // edge count
            0, 0, 0, 3, 0, 0, 0, 4, // edge
            0, // halted
        ]
    );
    assert_eq!(codec::declared_size(&bytes)?, bytes.len());
    assert_eq!(
        <Vertex<i32, i32, i32> as Codec>::MIN_ENCODED_LEN,
        4 + 4 + 4 + 1
    );
    Ok(())
}
