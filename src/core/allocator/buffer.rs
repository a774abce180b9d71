//! Physical byte access for the block engine

use crate::blocks::Blocks;
use crate::error::{BlockError, Result};
use crate::storage::{BackingStore, BlockStorageKind, BlockToBytesConverter};
use std::io::Cursor;
use std::ops::Range;

/// Growth factor applied when the store runs out of room
const GROW_FACTOR: usize = 2;

/// Owns the backing store and translates block ranges into byte ranges
pub struct ByteBufferAllocator {
    store: Box<dyn BackingStore>,
    converter: BlockToBytesConverter,
    max_bytes: Option<usize>,
}

impl ByteBufferAllocator {
    pub fn new(store: Box<dyn BackingStore>, converter: BlockToBytesConverter) -> Self {
        ByteBufferAllocator {
            store,
            converter,
            max_bytes: None,
        }
    }

    /// Cap physical growth at `max_bytes`
    pub fn with_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn converter(&self) -> BlockToBytesConverter {
        self.converter
    }

    pub fn storage_kind(&self) -> BlockStorageKind {
        self.store.kind()
    }

    /// Physical size in bytes
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Whole blocks the store can hold
    pub fn capacity_blocks(&self) -> usize {
        self.converter.whole_blocks(self.store.len())
    }

    /// Make room for at least `required_bytes`, keeping `[0, copy_len)` intact
    ///
    /// Grows geometrically, rounded to whole blocks. Returns whether the store
    /// actually grew.
    pub fn ensure_size(&mut self, required_bytes: usize, copy_len: usize) -> Result<bool> {
        let current = self.store.len();
        if required_bytes <= current {
            return Ok(false);
        }

        let block_size = self.converter.block_size();
        let mut target = required_bytes
            .max(current.saturating_mul(GROW_FACTOR))
            .max(block_size);
        target = self.converter.to_bytes(self.converter.blocks_for(target));

        if let Some(max) = self.max_bytes {
            if required_bytes > max {
                return Err(BlockError::CapacityExceeded {
                    requested: required_bytes,
                    max,
                });
            }
            target = target.min(max).max(required_bytes);
        }

        self.store.grow(target, copy_len.min(current))?;
        tracing::info!(
            "Grew {} store from {} to {} bytes",
            self.store.kind(),
            current,
            target
        );
        Ok(true)
    }

    fn check_range(&self, start: usize, len: usize) -> Result<Range<usize>> {
        let capacity = self.store.len();
        match start.checked_add(len) {
            Some(end) if end <= capacity => Ok(start..end),
            _ => Err(BlockError::OutOfBounds {
                start,
                len,
                capacity,
            }),
        }
    }

    /// Scoped read/write view over `[start_byte, end_byte)`
    ///
    /// The cursor starts at position 0 of the view; reads and writes advance
    /// the same position.
    pub fn with_buffer_io<R, F>(&mut self, start_byte: usize, end_byte: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut Cursor<&mut [u8]>) -> std::io::Result<R>,
    {
        let len = end_byte.saturating_sub(start_byte);
        if end_byte < start_byte {
            return Err(BlockError::OutOfBounds {
                start: start_byte,
                len,
                capacity: self.store.len(),
            });
        }
        let range = self.check_range(start_byte, len)?;
        let mut cursor = Cursor::new(&mut self.store.bytes_mut()[range]);
        Ok(f(&mut cursor)?)
    }

    /// Scoped read-only view over `[start_byte, end_byte)`
    pub fn with_buffer_read<R, F>(&self, start_byte: usize, end_byte: usize, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        if end_byte < start_byte {
            return Err(BlockError::OutOfBounds {
                start: start_byte,
                len: 0,
                capacity: self.store.len(),
            });
        }
        let range = self.check_range(start_byte, end_byte - start_byte)?;
        Ok(f(&self.store.bytes()[range]))
    }

    pub fn read_bytes(&self, start: usize, len: usize) -> Result<Vec<u8>> {
        self.with_buffer_read(start, start.saturating_add(len), |bytes| bytes.to_vec())
    }

    pub fn write_bytes(&mut self, start: usize, data: &[u8]) -> Result<()> {
        let range = self.check_range(start, data.len())?;
        self.store.bytes_mut()[range].copy_from_slice(data);
        Ok(())
    }

    /// Relocate `len` bytes from `start` to `new_start`
    ///
    /// Source and destination may overlap: the copy runs high-to-low when the
    /// destination sits above the source and low-to-high otherwise.
    pub fn move_bytes(&mut self, start: usize, len: usize, new_start: usize) -> Result<()> {
        let source = self.check_range(start, len)?;
        self.check_range(new_start, len)?;
        if len == 0 || start == new_start {
            return Ok(());
        }

        self.store.bytes_mut().copy_within(source, new_start);
        tracing::trace!("Moved {} bytes from {} to {}", len, start, new_start);
        Ok(())
    }

    /// Relocate the bytes of a whole block range so it starts at `to_start`
    pub fn move_blocks(&mut self, from: &Blocks, to_start: usize) -> Result<()> {
        let range = self.converter.byte_range(from);
        self.move_bytes(
            range.start,
            range.len(),
            self.converter.byte_offset(to_start),
        )
    }
}

impl std::fmt::Debug for ByteBufferAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBufferAllocator")
            .field("kind", &self.store.kind())
            .field("capacity", &self.store.len())
            .field("block_size", &self.converter.block_size())
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
