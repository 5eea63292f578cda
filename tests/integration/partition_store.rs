#![allow(missing_docs)]

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::sync::Arc;
use std::thread;

use bsp_graph::codec::{self, Codec};
use bsp_graph::config::{Config, PartitionConfig};
use bsp_graph::error::{GraphError, Result};
use bsp_graph::graph::{EdgeStrategy, Vertex};
use bsp_graph::storage::{CountingProgress, Partition, PartitionKind, PartitionStore};
use bsp_graph::types::{GraphTypes, GraphVertex, PartitionId};
use tempfile::tempdir;

struct Weighted;

impl GraphTypes for Weighted {
    type Id = i64;
    type Value = f64;
    type EdgeValue = f32;
    type Message = f64;
}

const KINDS: [PartitionKind; 2] = [PartitionKind::ByteArray, PartitionKind::Simple];

fn config(kind: PartitionKind) -> PartitionConfig {
    PartitionConfig {
        partition_kind: kind,
        ..Config::testing().partition()
    }
}

fn vertex(id: i64, value: f64, edges: i64) -> GraphVertex<Weighted> {
    let mut vertex = Vertex::new(id, value, EdgeStrategy::Hashed);
    for target in 0..edges {
        vertex.add_edge(target, target as f32);
    }
    vertex
}

fn filled(kind: PartitionKind, id: u32, ids: std::ops::Range<i64>) -> Result<Partition<Weighted>> {
    let mut partition = Partition::new(PartitionId(id), &config(kind));
    for vid in ids {
        partition.put_vertex(&vertex(vid, vid as f64, vid % 4))?;
    }
    Ok(partition)
}

#[test]
fn put_get_and_remove() -> Result<()> {
    for kind in KINDS {
        let mut partition = Partition::<Weighted>::new(PartitionId(3), &config(kind));
        assert_eq!(partition.kind(), kind);
        assert!(partition.put_vertex(&vertex(1, 0.5, 3))?.is_none());
        assert!(partition.put_vertex(&vertex(2, 1.5, 0))?.is_none());

        let previous = partition.put_vertex(&vertex(1, 9.0, 1))?.cloned();
        let previous = previous.expect("replacing returns the old vertex");
        assert_eq!(*previous.value(), 0.5);
        assert_eq!(previous.num_edges(), 3);

        let current = partition.get_vertex(&1)?.expect("stored");
        assert_eq!(*current.value(), 9.0);
        assert_eq!(current.edge_value(&0), Some(0.0));
        assert!(partition.get_vertex(&42)?.is_none());

        assert_eq!(partition.vertex_count(), 2);
        assert_eq!(partition.edge_count()?, 1);

        let removed = partition.remove_vertex(&2)?.map(|v| *v.value());
        assert_eq!(removed, Some(1.5));
        assert!(partition.remove_vertex(&2)?.is_none());
        assert!(!partition.contains_vertex(&2));
        assert_eq!(partition.vertex_count(), 1);
    }
    Ok(())
}

#[test]
fn saved_scratch_changes_are_persisted() -> Result<()> {
    for kind in KINDS {
        let mut partition = filled(kind, 0, 0..10)?;
        let mut edited = partition.get_vertex(&5)?.expect("stored").clone();
        edited.set_value(-1.0);
        edited.add_edge(100, 2.5);
        edited.vote_to_halt();
        partition.save_vertex(&edited)?;

        let reread = partition.get_vertex(&5)?.expect("stored");
        assert_eq!(*reread.value(), -1.0);
        assert_eq!(reread.edge_value(&100), Some(2.5));
        assert!(reread.is_halted());
    }
    Ok(())
}

#[test]
fn writer_saves_from_another_thread() -> Result<()> {
    for kind in KINDS {
        let mut partition = filled(kind, 0, 0..4)?;
        let writer = partition.writer();
        thread::spawn(move || -> Result<()> {
            let mut edited = vertex(2, 20.0, 1);
            edited.vote_to_halt();
            writer.save_vertex(&edited)?;
            writer.save_vertex(&vertex(9, 9.0, 0))
        })
        .join()
        .expect("writer thread panicked")?;

        assert_eq!(partition.vertex_count(), 5);
        let saved = partition.get_vertex(&2)?.expect("stored");
        assert_eq!(*saved.value(), 20.0);
        assert!(saved.is_halted());
        assert_eq!(saved.num_edges(), 1);
        assert!(partition.get_vertex(&9)?.is_some());
    }
    Ok(())
}

#[test]
fn cursor_visits_every_vertex_once() -> Result<()> {
    for kind in KINDS {
        let mut partition = filled(kind, 1, 0..50)?;
        let mut seen = Vec::new();
        let mut cursor = partition.cursor();
        assert_eq!(cursor.remaining(), 50);
        while let Some(next) = cursor.next_vertex() {
            let vertex = next?;
            assert_eq!(*vertex.value(), *vertex.id() as f64);
            seen.push(*vertex.id());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn writers_add_vertices_from_many_threads() -> Result<()> {
    for kind in KINDS {
        let mut partition = Partition::<Weighted>::new(PartitionId(0), &config(kind));
        let handles: Vec<_> = (0..4i64)
            .map(|t| {
                let writer = partition.writer();
                thread::spawn(move || -> Result<()> {
                    for i in 0..250 {
                        let id = t * 250 + i;
                        assert!(!writer.put_vertex(&vertex(id, 1.0, 2))?);
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked")?;
        }
        assert_eq!(partition.vertex_count(), 1000);
        assert_eq!(partition.edge_count()?, 2000);

        let writer = partition.writer();
        assert!(writer.remove_vertex(&0));
        assert!(!writer.remove_vertex(&0));
        assert_eq!(writer.vertex_count(), 999);
    }
    Ok(())
}

#[test]
fn merge_moves_disjoint_vertices() -> Result<()> {
    for kind in KINDS {
        let mut left = filled(kind, 7, 0..100)?;
        let right = filled(kind, 7, 100..250)?;
        left.merge(right)?;
        assert_eq!(left.vertex_count(), 250);
        assert!(left.get_vertex(&249)?.is_some());
    }
    Ok(())
}

#[test]
fn merge_prefers_incoming_vertex_on_overlap() -> Result<()> {
    for kind in KINDS {
        let mut left = filled(kind, 2, 0..10)?;
        let mut right = Partition::new(PartitionId(2), &config(kind));
        right.put_vertex(&vertex(4, 400.0, 0))?;
        right.put_vertex(&vertex(10, 10.0, 0))?;
        left.merge(right)?;

        assert_eq!(left.vertex_count(), 11);
        let merged = left.get_vertex(&4)?.expect("stored");
        assert_eq!(*merged.value(), 400.0);
        assert_eq!(merged.num_edges(), 0);
    }
    Ok(())
}

#[test]
fn merging_different_kinds_is_refused() -> Result<()> {
    let mut bytes = filled(PartitionKind::ByteArray, 0, 0..3)?;
    let simple = filled(PartitionKind::Simple, 0, 3..6)?;
    match bytes.merge(simple) {
        Err(GraphError::CapabilityMismatch { expected, found }) => {
            assert_eq!(expected, "byte-array");
            assert_eq!(found, "simple");
        }
        other => panic!("expected a capability mismatch, got {other:?}"),
    }
    assert_eq!(bytes.vertex_count(), 3);
    Ok(())
}

#[test]
fn serialized_layout_is_shared_by_both_kinds() -> Result<()> {
    let mut source = filled(PartitionKind::ByteArray, 11, 0..40)?;
    let bytes = source.to_bytes()?;

    let mut copy = Partition::<Weighted>::from_bytes(&bytes, &config(PartitionKind::Simple))?;
    assert_eq!(copy.id(), PartitionId(11));
    assert_eq!(copy.vertex_count(), 40);
    for id in 0..40 {
        let expected = source.get_vertex(&id)?.cloned();
        assert_eq!(copy.get_vertex(&id)?.cloned(), expected);
    }
    Ok(())
}

#[test]
fn checkpoint_round_trips_through_a_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("partition-5.bin");
    for kind in KINDS {
        let progress = Arc::new(CountingProgress::default());
        let source = filled(kind, 5, 0..64)?.with_progress(progress.clone());
        {
            let mut out = BufWriter::new(File::create(&path)?);
            source.write_to(&mut out)?;
            out.flush()?;
        }
        assert_eq!(progress.count(), 64);

        let mut restored = Partition::<Weighted>::new(PartitionId(0), &config(kind));
        restored.read_from(&mut BufReader::new(File::open(&path)?))?;
        assert_eq!(restored.id(), PartitionId(5));
        assert_eq!(restored.vertex_count(), 64);
        assert_eq!(restored.edge_count()?, (0..64i64).map(|i| (i % 4) as u64).sum::<u64>());
    }
    Ok(())
}

#[test]
fn corrupt_input_leaves_partition_untouched() -> Result<()> {
    for kind in KINDS {
        let bytes = filled(kind, 1, 0..5)?.to_bytes()?;
        let mut target = filled(kind, 9, 100..103)?;

        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            target.read_bytes(truncated),
            Err(GraphError::Corruption(_))
        ));
        assert_eq!(target.id(), PartitionId(9));
        assert_eq!(target.vertex_count(), 3);
        assert!(target.get_vertex(&100)?.is_some());
    }
    Ok(())
}

#[test]
fn partitions_written_back_to_back_are_read_one_at_a_time() -> Result<()> {
    for kind in KINDS {
        let mut stream = Vec::new();
        filled(kind, 1, 0..30)?.write_to(&mut stream)?;
        filled(kind, 2, 30..45)?.write_to(&mut stream)?;
        let mut input = Cursor::new(stream);

        let mut first = Partition::<Weighted>::new(PartitionId(0), &config(kind));
        first.read_from(&mut input)?;
        assert_eq!(first.id(), PartitionId(1));
        assert_eq!(first.vertex_count(), 30);

        let mut second = Partition::<Weighted>::new(PartitionId(0), &config(kind));
        second.read_from(&mut input)?;
        assert_eq!(second.id(), PartitionId(2));
        assert_eq!(second.vertex_count(), 15);
        assert!(second.get_vertex(&44)?.is_some());

        assert!(matches!(
            second.read_from(&mut input),
            Err(GraphError::Corruption(_))
        ));
        assert_eq!(second.vertex_count(), 15);
    }
    Ok(())
}

fn same_entry_twice() -> Result<Vec<u8>> {
    let blob = codec::to_bytes_with_size(&vertex(0, 1.0, 2))?;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&2u32.to_be_bytes());
    for _ in 0..2 {
        0i64.encode(&mut bytes);
        bytes.extend_from_slice(&(blob.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&blob);
    }
    Ok(bytes)
}

#[test]
fn duplicate_vertex_id_in_input_is_corruption() -> Result<()> {
    let bytes = same_entry_twice()?;
    for kind in KINDS {
        let mut target = filled(kind, 9, 100..103)?;
        match target.read_bytes(&bytes) {
            Err(GraphError::Corruption(msg)) => assert!(msg.contains("duplicate"), "{msg}"),
            other => panic!("expected corruption, got {other:?}"),
        }
        assert!(matches!(
            target.read_from(&mut Cursor::new(&bytes)),
            Err(GraphError::Corruption(_))
        ));
        assert_eq!(target.id(), PartitionId(9));
        assert_eq!(target.vertex_count(), 3);
        assert!(target.get_vertex(&100)?.is_some());
        assert!(!target.contains_vertex(&0));
    }
    Ok(())
}
