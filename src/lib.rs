//! # blockmap - Block-Mapped Byte Storage
//!
//! `blockmap-rs` stores many variable-length byte records inside one large,
//! growable backing store. The store is divided into fixed-size blocks; each
//! record owns a contiguous run of blocks and is accessed through a
//! [`MappedBytes`] handle that stays valid across resizes and compaction.
//!
//! - **Two backends**: a heap buffer or a memory-mapped temporary file
//! - **Best-fit allocation** with coalescing free lists and geometric growth
//! - **Defragmentation**: bounded opportunistic passes and full compaction
//! - **Streams**: snapshot readers and buffered writers over any record
//! - **In-memory filesystem** for generated sources and class files
//!
//! ## Quick Start
//!
//! ```rust
//! use blockmap_rs::{BlockMapper, Result};
//!
//! # fn main() -> Result<()> {
//! let mapper = BlockMapper::heap(64)?;
//!
//! let record = mapper.allocate(b"Hello, World!")?;
//! record.set_bytes(b"a longer payload that needs more than one block of storage")?;
//! assert_eq!(record.size()?, 58);
//!
//! record.delete()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Configuration
//!
//! ```rust
//! use blockmap_rs::{BlockMapperBuilder, MemoryFileSystem, Result};
//!
//! # fn main() -> Result<()> {
//! let mapper = BlockMapperBuilder::new()
//!     .block_size(128)
//!     .mapped_file()
//!     .verify_checksums()
//!     .build()?;
//!
//! let fs = MemoryFileSystem::new(mapper);
//! fs.write("gen/Parser.java", b"class Parser {}")?;
//! assert_eq!(fs.list("gen")?, vec!["/gen/Parser.java".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{allocator, blocks, config, error, mapper, storage, stream, vfs};

pub use crate::core::{
    allocator::{AllocationId, AllocationStats, LayoutEntry},
    blocks::Blocks,
    config::MapperConfig,
    error::{BlockError, Result},
    mapper::{BlockMapper, MappedBytes},
    storage::BlockStorageKind,
    stream::{MappedBytesReader, MappedBytesWriter},
    vfs::{normalize_path, MemoryFileSystem},
};

use std::path::PathBuf;
use tracing::info;

/// Builder for [`BlockMapper`] with custom configuration
///
/// # Examples
///
/// ```rust
/// use blockmap_rs::BlockMapperBuilder;
///
/// # fn main() -> blockmap_rs::Result<()> {
/// let mapper = BlockMapperBuilder::new()
///     .block_size(32)
///     .initial_blocks(256)
///     .max_bytes(1 << 20)
///     .defrag_threshold(0.3)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockMapperBuilder {
    config: MapperConfig,
}

impl BlockMapperBuilder {
    /// Create a builder with default settings (heap store, 64-byte blocks)
    pub fn new() -> Self {
        BlockMapperBuilder {
            config: MapperConfig::default(),
        }
    }

    /// Start from an existing configuration, e.g. one loaded from TOML
    pub fn from_config(config: MapperConfig) -> Self {
        BlockMapperBuilder { config }
    }

    /// Set the number of bytes per block
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Set how many blocks the store starts with
    pub fn initial_blocks(mut self, blocks: usize) -> Self {
        self.config.initial_blocks = blocks;
        self
    }

    pub fn storage(mut self, storage: BlockStorageKind) -> Self {
        self.config.storage = storage;
        self
    }

    /// Back the store with a heap buffer
    pub fn heap(self) -> Self {
        self.storage(BlockStorageKind::Heap)
    }

    /// Back the store with a memory-mapped temporary file
    pub fn mapped_file(self) -> Self {
        self.storage(BlockStorageKind::MappedFile)
    }

    /// Directory for the mapped file (implies nothing for heap stores)
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Cap the physical size of the store
    pub fn max_bytes(mut self, max: usize) -> Self {
        self.config.max_bytes = Some(max);
        self
    }

    pub fn auto_defrag(mut self, enabled: bool) -> Self {
        self.config.auto_defrag = enabled;
        self
    }

    pub fn defrag_threshold(mut self, threshold: f64) -> Self {
        self.config.defrag_threshold = threshold;
        self
    }

    pub fn simple_defrag_max_moves(mut self, moves: usize) -> Self {
        self.config.simple_defrag_max_moves = moves;
        self
    }

    /// Keep a CRC32 per record and verify it on every read
    pub fn verify_checksums(mut self) -> Self {
        self.config.verify_checksums = true;
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Validate the configuration and create the mapper
    pub fn build(self) -> Result<BlockMapper> {
        info!(
            "Building {} block mapper with {}-byte blocks",
            self.config.storage, self.config.block_size
        );
        BlockMapper::new(self.config)
    }
}
