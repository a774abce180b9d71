//! End-to-end tests for mapped byte records, run against both storage kinds

use blockmap_rs::{BlockError, BlockMapper, BlockMapperBuilder, BlockStorageKind, MappedBytes};
use std::io::Read;

fn mappers(block_size: usize) -> Vec<BlockMapper> {
    [BlockStorageKind::Heap, BlockStorageKind::MappedFile]
        .into_iter()
        .map(|kind| {
            BlockMapperBuilder::new()
                .block_size(block_size)
                .initial_blocks(4)
                .storage(kind)
                .build()
                .unwrap()
        })
        .collect()
}

fn assert_no_overlap(handles: &[MappedBytes]) {
    for (i, a) in handles.iter().enumerate() {
        for b in &handles[i + 1..] {
            let (ra, rb) = (a.blocks().unwrap(), b.blocks().unwrap());
            assert!(!ra.overlaps_blocks(&rb), "{} overlaps {}", ra, rb);
        }
    }
}

#[test]
fn test_round_trip_edge_payloads() {
    let every_byte: Vec<u8> = (0..=255u8).collect();
    for mapper in mappers(16) {
        let empty = mapper.allocate(&[]).unwrap();
        let full = mapper.allocate(&every_byte).unwrap();
        let one = mapper.allocate(&[42]).unwrap();

        assert!(empty.get_bytes().unwrap().is_empty());
        assert_eq!(empty.size().unwrap(), 0);
        assert_eq!(empty.blocks().unwrap().count(), 1);
        assert_eq!(full.get_bytes().unwrap(), every_byte);
        assert_eq!(one.get_bytes().unwrap(), vec![42]);
        assert_no_overlap(&[empty, full, one]);
        mapper.check_invariants().unwrap();
    }
}

#[test]
fn test_many_allocations_never_overlap() {
    for mapper in mappers(8) {
        let handles: Vec<_> = (0..200)
            .map(|i| mapper.allocate(&vec![i as u8; i % 37]).unwrap())
            .collect();

        assert_no_overlap(&handles);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(handle.get_bytes().unwrap(), vec![i as u8; i % 37]);
        }
        mapper.check_invariants().unwrap();
    }
}

#[test]
fn test_read_with_in_flight_write() {
    let original: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
    let replacement = vec![0xEE; 900];

    for mapper in mappers(16) {
        let bytes = mapper.allocate(&original).unwrap();
        let _neighbour = mapper.allocate(b"pinned after the record").unwrap();

        let mut stream = bytes.open_input_stream().unwrap();
        let mut head = [0u8; 50];
        stream.read_exact(&mut head).unwrap();

        // Forces a relocation because the neighbour blocks in-place growth
        bytes.set_bytes(&replacement).unwrap();

        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        let mut seen = head.to_vec();
        seen.extend(tail);
        assert_eq!(seen, original);

        let mut fresh = Vec::new();
        bytes.open_input_stream().unwrap().read_to_end(&mut fresh).unwrap();
        assert_eq!(fresh, replacement);
    }
}

#[test]
fn test_shrink_then_regrow_interleaved() {
    for mapper in mappers(8) {
        let originals: Vec<Vec<u8>> = (0..40)
            .map(|i| (0..(10 + i * 13)).map(|j| (i * 7 + j) as u8).collect())
            .collect();
        let handles: Vec<_> = originals.iter().map(|d| mapper.allocate(d).unwrap()).collect();

        for (i, handle) in handles.iter().enumerate() {
            handle.set_bytes(&vec![i as u8; 1 + i % 2]).unwrap();
        }
        mapper.full_defrag().unwrap();

        for (i, handle) in handles.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
            handle.set_bytes(&originals[i]).unwrap();
        }

        for (i, handle) in handles.iter().enumerate() {
            let expected = if i % 2 == 0 {
                originals[i].clone()
            } else {
                vec![i as u8; 1 + i % 2]
            };
            assert_eq!(handle.get_bytes().unwrap(), expected, "record {}", i);
        }

        for (i, handle) in handles.iter().enumerate().filter(|(i, _)| i % 2 == 1) {
            handle.set_bytes(&originals[i]).unwrap();
        }
        for (handle, original) in handles.iter().zip(&originals) {
            assert_eq!(&handle.get_bytes().unwrap(), original);
        }
        assert_no_overlap(&handles);
        mapper.check_invariants().unwrap();
    }
}

#[test]
fn test_handle_lifecycle() {
    for mapper in mappers(16) {
        let keep = mapper.allocate(b"keep").unwrap();
        let drop_me = mapper.allocate(b"drop me").unwrap();
        let alias = drop_me.clone();
        assert_eq!(alias, drop_me);
        assert_ne!(keep, drop_me);

        drop_me.delete().unwrap();
        assert!(alias.is_deleted());
        assert!(matches!(alias.delete(), Err(BlockError::Deleted(id)) if id == drop_me.id()));
        assert!(matches!(alias.size(), Err(BlockError::Deleted(_))));

        assert_eq!(keep.get_bytes().unwrap(), b"keep");
        assert_eq!(mapper.live_records(), 1);
        mapper.check_invariants().unwrap();
    }
}

#[test]
fn test_stats_and_layout_reflect_records() {
    for mapper in mappers(16) {
        let a = mapper.allocate(&[1; 40]).unwrap();
        let b = mapper.allocate(&[2; 10]).unwrap();

        let stats = mapper.stats();
        assert_eq!(stats.live_allocations, 2);
        assert_eq!(stats.used_blocks, 4);
        assert_eq!(stats.used_blocks + stats.free_blocks, stats.total_blocks);

        let layout = mapper.layout();
        let live: Vec<_> = layout.iter().filter(|e| e.is_live()).map(|e| e.blocks()).collect();
        assert_eq!(live, vec![a.blocks().unwrap(), b.blocks().unwrap()]);

        let json = mapper.stats_json().unwrap();
        assert!(json.contains("\"live_allocations\": 2"));
    }
}

#[test]
fn test_growing_tail_record_reuses_freed_space() {
    for kind in [BlockStorageKind::Heap, BlockStorageKind::MappedFile] {
        for cap in [Some(64), None] {
            let mut builder = BlockMapperBuilder::new()
                .block_size(8)
                .initial_blocks(8)
                .storage(kind)
                .auto_defrag(false);
            if let Some(max) = cap {
                builder = builder.max_bytes(max);
            }
            let mapper = builder.build().unwrap();

            let first = mapper.allocate(&[1; 40]).unwrap();
            let last = mapper.allocate(&[2; 8]).unwrap();
            first.delete().unwrap();

            last.set_bytes(&[3; 32]).unwrap();
            assert_eq!(last.get_bytes().unwrap(), vec![3; 32]);
            assert_eq!(last.blocks().unwrap().start(), 0);

            let stats = mapper.stats();
            assert_eq!(stats.total_blocks, 8, "{:?} store grew with cap {:?}", kind, cap);
            assert_eq!(stats.free_gaps, 1);
            mapper.check_invariants().unwrap();
        }
    }
}
