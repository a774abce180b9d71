//! Backing stores for the block engine
//!
//! A backing store is one contiguous, growable run of bytes. Two kinds exist
//! with the same contract:
//! - [`HeapStore`]: a plain `Vec<u8>`
//! - [`MmapStore`]: a shared memory map over an anonymous temp file
//!
//! [`BlockToBytesConverter`] translates block indices into byte offsets so the
//! allocator can reason in blocks while the store only sees bytes.

pub mod heap;
pub mod mmap;

pub use heap::HeapStore;
pub use mmap::MmapStore;

use crate::blocks::Blocks;
use crate::config::MapperConfig;
use crate::error::{BlockError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Which kind of memory backs a mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStorageKind {
    /// Growable heap array
    #[default]
    Heap,
    /// Memory-mapped temp file
    MappedFile,
}

impl fmt::Display for BlockStorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStorageKind::Heap => f.write_str("heap"),
            BlockStorageKind::MappedFile => f.write_str("mapped_file"),
        }
    }
}

/// Growable byte storage
pub trait BackingStore: Send + Sync {
    fn kind(&self) -> BlockStorageKind;

    /// Current physical size in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow to exactly `new_len` bytes
    ///
    /// Bytes in `[0, copy_len)` survive the growth; anything past `copy_len`
    /// may or may not. Calls with `new_len <= len()` do nothing.
    fn grow(&mut self, new_len: usize, copy_len: usize) -> Result<()>;

    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Converts between block counts and byte sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockToBytesConverter {
    block_size: usize,
}

impl BlockToBytesConverter {
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(BlockError::InvalidBlockSize(block_size));
        }
        Ok(BlockToBytesConverter { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Byte size of `blocks` whole blocks
    pub fn to_bytes(&self, blocks: usize) -> usize {
        blocks * self.block_size
    }

    /// Byte offset of a block index
    pub fn byte_offset(&self, block: usize) -> usize {
        block * self.block_size
    }

    /// Physical byte range covered by a block range
    pub fn byte_range(&self, blocks: &Blocks) -> Range<usize> {
        self.byte_offset(blocks.start())..self.byte_offset(blocks.end())
    }

    /// Blocks needed to hold `bytes`; every allocation owns at least one
    pub fn blocks_for(&self, bytes: usize) -> usize {
        ((bytes + self.block_size - 1) / self.block_size).max(1)
    }

    /// Whole blocks that fit in `bytes`
    pub fn whole_blocks(&self, bytes: usize) -> usize {
        bytes / self.block_size
    }
}

/// Open the store described by `config` with room for `initial_len` bytes
pub fn open_store(config: &MapperConfig, initial_len: usize) -> Result<Box<dyn BackingStore>> {
    let store: Box<dyn BackingStore> = match config.storage {
        BlockStorageKind::Heap => Box::new(HeapStore::new(initial_len)),
        BlockStorageKind::MappedFile => {
            Box::new(MmapStore::new(initial_len, config.temp_dir.as_deref())?)
        }
    };
    tracing::debug!(
        "Opened {} backing store with {} bytes",
        store.kind(),
        store.len()
    );
    Ok(store)
}
