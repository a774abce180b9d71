//! Heap-backed store

use super::{BackingStore, BlockStorageKind};
use crate::error::Result;

/// Backing store over a heap-allocated byte array
#[derive(Debug, Default)]
pub struct HeapStore {
    data: Vec<u8>,
}

impl HeapStore {
    pub fn new(len: usize) -> Self {
        HeapStore {
            data: vec![0u8; len],
        }
    }
}

impl BackingStore for HeapStore {
    fn kind(&self) -> BlockStorageKind {
        BlockStorageKind::Heap
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn grow(&mut self, new_len: usize, copy_len: usize) -> Result<()> {
        if new_len <= self.data.len() {
            return Ok(());
        }

        // Fresh array: only the live prefix is worth copying
        let keep = copy_len.min(self.data.len());
        let mut grown = vec![0u8; new_len];
        grown[..keep].copy_from_slice(&self.data[..keep]);
        self.data = grown;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_preserves_prefix() {
        let mut store = HeapStore::new(8);
        store.bytes_mut().copy_from_slice(b"abcdefgh");

        store.grow(32, 4).unwrap();
        assert_eq!(store.len(), 32);
        assert_eq!(&store.bytes()[..4], b"abcd");
    }

    #[test]
    fn test_grow_smaller_is_noop() {
        let mut store = HeapStore::new(16);
        store.bytes_mut()[0] = 7;
        store.grow(8, 0).unwrap();
        assert_eq!(store.len(), 16);
        assert_eq!(store.bytes()[0], 7);
    }
}
