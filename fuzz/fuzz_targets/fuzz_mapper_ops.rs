#![no_main]
use blockmap_rs::{BlockMapperBuilder, BlockStorageKind, MappedBytes};
use libfuzzer_sys::{arbitrary::{Arbitrary, Unstructured}, fuzz_target};

#[derive(Debug, Arbitrary)]
enum MapperOp {
    Allocate(Vec<u8>),
    Set { idx: u8, data: Vec<u8> },
    Delete { idx: u8 },
    SimpleDefrag,
    FullDefrag,
}

// Random operation sequences must keep every live record intact
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let (block_size, mapped, ops): (u8, bool, Vec<MapperOp>) = match u.arbitrary() {
        Ok(parts) => parts,
        Err(_) => return,
    };

    let storage = if mapped {
        BlockStorageKind::MappedFile
    } else {
        BlockStorageKind::Heap
    };
    let mapper = match BlockMapperBuilder::new()
        .block_size(block_size.max(1) as usize)
        .initial_blocks(1)
        .storage(storage)
        .max_bytes(1 << 20)
        .build()
    {
        Ok(m) => m,
        Err(_) => return,
    };

    let mut live: Vec<(MappedBytes, Vec<u8>)> = Vec::new();
    for op in ops.into_iter().take(64) {
        match op {
            MapperOp::Allocate(data) => {
                if let Ok(handle) = mapper.allocate(&data) {
                    live.push((handle, data));
                }
            }
            MapperOp::Set { idx, data } if !live.is_empty() => {
                let entry = &mut live[idx as usize % live.len()];
                if entry.0.set_bytes(&data).is_ok() {
                    entry.1 = data;
                }
            }
            MapperOp::Delete { idx } if !live.is_empty() => {
                let (handle, _) = live.swap_remove(idx as usize % live.len());
                handle.delete().unwrap();
            }
            MapperOp::SimpleDefrag => {
                mapper.simple_defrag().unwrap();
            }
            MapperOp::FullDefrag => {
                mapper.full_defrag().unwrap();
            }
            _ => {}
        }
    }

    mapper.check_invariants().unwrap();
    for (handle, data) in &live {
        assert_eq!(&handle.get_bytes().unwrap(), data);
    }
});
