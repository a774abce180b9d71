//! Byte-array records over the block engine
//!
//! [`BlockMapper`] is the entry point: it owns the backing store and the
//! allocation table behind one reader/writer lock and hands out
//! [`MappedBytes`] handles. A handle carries only a stable allocation id, so
//! resizes and defragmentation never invalidate it; every access looks the
//! current range up under the lock.

use crate::allocator::{
    AllocationId, AllocationStats, BlockManager, ByteBufferAllocator, LayoutEntry,
};
use crate::blocks::Blocks;
use crate::config::MapperConfig;
use crate::error::{BlockError, Result};
use crate::storage::{self, BlockStorageKind, BlockToBytesConverter};
use crate::stream::{MappedBytesReader, MappedBytesWriter};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Per-record bookkeeping kept next to the allocation table
#[derive(Debug, Clone, Copy)]
struct Record {
    len: usize,
    checksum: Option<u32>,
}

impl Record {
    fn new(data: &[u8], verify: bool) -> Self {
        Record {
            len: data.len(),
            checksum: verify.then(|| crc32fast::hash(data)),
        }
    }
}

struct MapperState {
    buffer: ByteBufferAllocator,
    manager: BlockManager,
    records: AHashMap<AllocationId, Record>,
}

impl MapperState {
    fn record(&self, id: AllocationId) -> Result<Record> {
        self.records.get(&id).copied().ok_or(BlockError::Deleted(id))
    }

    fn read(&self, id: AllocationId) -> Result<Vec<u8>> {
        let record = self.record(id)?;
        let blocks = self.manager.blocks(id)?;
        let offset = self.manager.converter().byte_offset(blocks.start());
        let data = self.buffer.read_bytes(offset, record.len)?;

        if let Some(expected) = record.checksum {
            if crc32fast::hash(&data) != expected {
                tracing::warn!("Checksum mismatch for {} at {}", id, blocks);
                return Err(BlockError::ChecksumMismatch(id));
            }
        }
        Ok(data)
    }
}

struct MapperInner {
    config: MapperConfig,
    state: RwLock<MapperState>,
}

/// Shared block storage for variable-length byte records
///
/// Cloning is cheap and yields another reference to the same storage.
#[derive(Clone)]
pub struct BlockMapper {
    inner: Arc<MapperInner>,
}

impl BlockMapper {
    pub fn new(config: MapperConfig) -> Result<Self> {
        config.validate()?;
        let converter = BlockToBytesConverter::new(config.block_size)?;
        let store = storage::open_store(&config, config.initial_bytes()?)?;
        let buffer = ByteBufferAllocator::new(store, converter).with_limit(config.max_bytes);
        let manager = BlockManager::new(converter, buffer.capacity_blocks());

        tracing::info!(
            "Created {} block mapper: block size {}, {} blocks",
            config.storage,
            config.block_size,
            manager.total_blocks()
        );

        Ok(BlockMapper {
            inner: Arc::new(MapperInner {
                config,
                state: RwLock::new(MapperState {
                    buffer,
                    manager,
                    records: AHashMap::new(),
                }),
            }),
        })
    }

    /// Heap-backed mapper with default settings and the given block size
    pub fn heap(block_size: usize) -> Result<Self> {
        Self::new(MapperConfig {
            block_size,
            storage: BlockStorageKind::Heap,
            ..MapperConfig::default()
        })
    }

    /// Mapped-file-backed mapper with default settings and the given block size
    pub fn mapped(block_size: usize) -> Result<Self> {
        Self::new(MapperConfig {
            block_size,
            storage: BlockStorageKind::MappedFile,
            ..MapperConfig::default()
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    pub fn block_size(&self) -> usize {
        self.inner.config.block_size
    }

    pub fn storage_kind(&self) -> BlockStorageKind {
        self.inner.config.storage
    }

    /// Store a copy of `data` and return a handle to it
    pub fn allocate(&self, data: &[u8]) -> Result<MappedBytes> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        let id = state.manager.allocate(&mut state.buffer, data.len())?;
        let blocks = state.manager.blocks(id)?;
        let offset = state.manager.converter().byte_offset(blocks.start());
        if let Err(e) = state.buffer.write_bytes(offset, data) {
            state.manager.delete(id)?;
            return Err(e);
        }
        state
            .records
            .insert(id, Record::new(data, self.inner.config.verify_checksums));

        Ok(MappedBytes {
            id,
            mapper: self.clone(),
        })
    }

    /// Number of live records
    pub fn live_records(&self) -> usize {
        self.inner.state.read().records.len()
    }

    /// Bounded opportunistic compaction; returns the number of moves
    pub fn simple_defrag(&self) -> Result<usize> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        state
            .manager
            .simple_defrag(&mut state.buffer, self.inner.config.simple_defrag_max_moves)
    }

    /// Compact every live record into a contiguous prefix of the store
    pub fn full_defrag(&self) -> Result<usize> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        state.manager.full_defrag(&mut state.buffer)
    }

    pub fn stats(&self) -> AllocationStats {
        let state = self.inner.state.read();
        state
            .manager
            .stats(state.buffer.storage_kind(), state.buffer.capacity())
    }

    pub fn stats_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.stats())?)
    }

    pub fn layout(&self) -> Vec<LayoutEntry> {
        self.inner.state.read().manager.layout()
    }

    /// Verify the allocation table tiles the store exactly
    pub fn check_invariants(&self) -> Result<()> {
        let state = self.inner.state.read();
        state.manager.check_invariants()?;
        if state.records.len() != state.manager.live_count() {
            return Err(BlockError::Corrupted(format!(
                "{} records for {} live allocations",
                state.records.len(),
                state.manager.live_count()
            )));
        }
        Ok(())
    }

    fn size_of(&self, id: AllocationId) -> Result<usize> {
        Ok(self.inner.state.read().record(id)?.len)
    }

    fn blocks_of(&self, id: AllocationId) -> Result<Blocks> {
        let state = self.inner.state.read();
        state.record(id)?;
        state.manager.blocks(id)
    }

    fn read(&self, id: AllocationId) -> Result<Vec<u8>> {
        self.inner.state.read().read(id)
    }

    fn write(&self, id: AllocationId, data: &[u8]) -> Result<()> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        state.record(id)?;

        let current = state.manager.blocks(id)?;
        let converter = state.manager.converter();
        let blocks = if converter.blocks_for(data.len()) == current.count() {
            current
        } else {
            // Old content is replaced wholesale, nothing to carry over
            state.manager.resize(&mut state.buffer, id, data.len(), 0)?
        };

        state
            .buffer
            .write_bytes(converter.byte_offset(blocks.start()), data)?;
        state
            .records
            .insert(id, Record::new(data, self.inner.config.verify_checksums));

        tracing::debug!("Wrote {} bytes to {} at {}", data.len(), id, blocks);
        Ok(())
    }

    fn delete(&self, id: AllocationId) -> Result<()> {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;

        if state.records.remove(&id).is_none() {
            tracing::warn!("Delete of already deleted {}", id);
            return Err(BlockError::Deleted(id));
        }
        state.manager.delete(id)?;

        let config = &self.inner.config;
        if config.auto_defrag && state.manager.fragmentation_score() > config.defrag_threshold {
            // The delete itself already happened; a failed compaction is not its error
            if let Err(e) = state
                .manager
                .simple_defrag(&mut state.buffer, config.simple_defrag_max_moves)
            {
                tracing::warn!("Auto defrag after deleting {} failed: {}", id, e);
            }
        }
        Ok(())
    }
}

impl fmt::Display for BlockMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        write!(f, "{} ({} store)", state.manager, state.buffer.storage_kind())
    }
}

impl fmt::Debug for BlockMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMapper")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Handle to one stored byte record
///
/// Clones refer to the same record. The record lives until [`delete`] is
/// called on any clone; dropping handles does not free it.
///
/// [`delete`]: MappedBytes::delete
#[derive(Clone)]
pub struct MappedBytes {
    id: AllocationId,
    mapper: BlockMapper,
}

impl MappedBytes {
    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn mapper(&self) -> &BlockMapper {
        &self.mapper
    }

    /// Payload length in bytes
    pub fn size(&self) -> Result<usize> {
        self.mapper.size_of(self.id)
    }

    /// Capacity of the current allocation in bytes
    pub fn allocation_size(&self) -> Result<usize> {
        let blocks = self.blocks()?;
        Ok(blocks.count() * self.mapper.block_size())
    }

    /// Current block range; re-query after anything that may move the record
    pub fn blocks(&self) -> Result<Blocks> {
        self.mapper.blocks_of(self.id)
    }

    pub fn get_bytes(&self) -> Result<Vec<u8>> {
        self.mapper.read(self.id)
    }

    /// Replace the content, reallocating when the size needs a different block count
    pub fn set_bytes(&self, data: &[u8]) -> Result<()> {
        self.mapper.write(self.id, data)
    }

    /// Reader over the content as it is right now
    ///
    /// Later writes, resizes or moves do not affect an open reader.
    pub fn open_input_stream(&self) -> Result<MappedBytesReader> {
        let snapshot = self.mapper.read(self.id)?;
        Ok(MappedBytesReader::new(self.id, snapshot))
    }

    /// Writer whose output replaces the content on flush or close
    pub fn open_output_stream(&self) -> Result<MappedBytesWriter> {
        self.mapper.size_of(self.id)?;
        Ok(MappedBytesWriter::new(self.clone()))
    }

    pub fn delete(&self) -> Result<()> {
        self.mapper.delete(self.id)
    }

    pub fn is_deleted(&self) -> bool {
        !self.mapper.inner.state.read().records.contains_key(&self.id)
    }
}

impl PartialEq for MappedBytes {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.mapper.inner, &other.mapper.inner)
    }
}

impl Eq for MappedBytes {}

impl fmt::Debug for MappedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBytes").field("id", &self.id).finish()
    }
}
