#![no_main]
use blockmap_rs::Blocks;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u16, u16, u16, u16)| {
    let (a_start, a_len, b_start, b_len) = input;
    let a = Blocks::new(a_start as usize, a_len as usize);
    let b = Blocks::new(b_start as usize, b_len as usize);

    assert_eq!(a.overlaps_blocks(&b), b.overlaps_blocks(&a));

    let pieces = a.get_non_overlap(&b);
    for piece in &pieces {
        assert!(!piece.is_empty());
        if let Some(overlap) = a.get_overlap(&b) {
            assert!(!piece.overlaps_blocks(&overlap));
        }
    }

    let mut moved = a;
    let migrated = moved.maybe_migrate(b.start(), b.count(), b.start() / 2, b.count());
    if !migrated {
        assert_eq!(moved, a);
    }
});
