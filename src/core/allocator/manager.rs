//! Live and free block bookkeeping
//!
//! The manager is the single authority over physical layout. It owns the
//! [`Blocks`] of every live allocation, keyed by a stable [`AllocationId`], so
//! relocations update one table entry and every handle observes the new range
//! on its next lookup.
//!
//! Free space is tracked as a B-tree of gaps keyed by start block, always
//! coalesced, so the free set never holds two adjacent gaps.

use super::buffer::ByteBufferAllocator;
use super::AllocationId;
use crate::blocks::Blocks;
use crate::error::{BlockError, Result};
use crate::storage::BlockToBytesConverter;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;

/// Allocation table for one backing store
#[derive(Debug, Clone)]
pub struct BlockManager {
    pub(super) converter: BlockToBytesConverter,

    /// Blocks currently covered by the backing store
    pub(super) total_blocks: usize,

    /// Free gaps indexed by start block
    pub(super) free: BTreeMap<usize, Blocks>,

    /// Live allocations indexed by start block
    pub(super) live: BTreeMap<usize, AllocationId>,

    /// Authoritative range of every live allocation
    pub(super) ranges: AHashMap<AllocationId, Blocks>,

    pub(super) free_blocks: usize,

    next_id: u64,
}

impl BlockManager {
    /// Create a manager for a store holding `total_blocks` blocks, all free
    pub fn new(converter: BlockToBytesConverter, total_blocks: usize) -> Self {
        let mut free = BTreeMap::new();
        if total_blocks > 0 {
            free.insert(0, Blocks::new(0, total_blocks));
        }

        BlockManager {
            converter,
            total_blocks,
            free,
            live: BTreeMap::new(),
            ranges: AHashMap::new(),
            free_blocks: total_blocks,
            next_id: 1,
        }
    }

    pub fn converter(&self) -> BlockToBytesConverter {
        self.converter
    }

    pub fn block_size(&self) -> usize {
        self.converter.block_size()
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub fn used_blocks(&self) -> usize {
        self.total_blocks - self.free_blocks
    }

    pub fn live_count(&self) -> usize {
        self.ranges.len()
    }

    /// Number of free gaps (fragmentation indicator)
    pub fn gap_count(&self) -> usize {
        self.free.len()
    }

    pub fn largest_gap(&self) -> usize {
        self.free.values().map(Blocks::count).max().unwrap_or(0)
    }

    /// External fragmentation: share of free blocks outside the largest gap
    ///
    /// 0.0 when all free space is one gap (or there is none), approaching 1.0
    /// as free space splinters.
    pub fn fragmentation_score(&self) -> f64 {
        if self.free_blocks == 0 {
            return 0.0;
        }
        1.0 - self.largest_gap() as f64 / self.free_blocks as f64
    }

    /// Current range of a live allocation
    pub fn blocks(&self, id: AllocationId) -> Result<Blocks> {
        self.ranges
            .get(&id)
            .copied()
            .ok_or(BlockError::UnknownAllocation(id))
    }

    pub fn is_live(&self, id: AllocationId) -> bool {
        self.ranges.contains_key(&id)
    }

    /// Live allocations in ascending address order
    pub fn live_ranges(&self) -> impl Iterator<Item = (AllocationId, Blocks)> + '_ {
        self.live
            .values()
            .filter_map(move |id| self.ranges.get(id).map(|b| (*id, *b)))
    }

    /// Free gaps in ascending address order
    pub fn free_ranges(&self) -> impl Iterator<Item = Blocks> + '_ {
        self.free.values().copied()
    }

    /// End of the highest live allocation
    pub fn high_water_mark(&self) -> usize {
        self.live
            .values()
            .next_back()
            .and_then(|id| self.ranges.get(id))
            .map_or(0, Blocks::end)
    }

    /// Allocate room for `size_bytes`
    ///
    /// Placement is best-fit: the smallest free gap that can hold the request,
    /// lowest address first among equals. When no gap fits the store grows and
    /// the allocation lands at the end.
    pub fn allocate(
        &mut self,
        buffer: &mut ByteBufferAllocator,
        size_bytes: usize,
    ) -> Result<AllocationId> {
        let count = self.converter.blocks_for(size_bytes);
        let blocks = match self.take_best_fit(count, None) {
            Some(blocks) => blocks,
            None => self.grow_for(buffer, count)?,
        };

        let id = AllocationId::new(self.next_id);
        self.next_id += 1;
        self.insert_live(id, blocks);

        tracing::debug!("Allocated {} at {} for {} bytes", id, blocks, size_bytes);
        Ok(id)
    }

    /// Return an allocation's range to the free set
    ///
    /// Bytes are left as they are.
    pub fn delete(&mut self, id: AllocationId) -> Result<Blocks> {
        let blocks = match self.ranges.remove(&id) {
            Some(blocks) => blocks,
            None => {
                tracing::warn!("Delete of unknown allocation {}", id);
                return Err(BlockError::UnknownAllocation(id));
            }
        };
        self.live.remove(&blocks.start());
        self.insert_free(blocks);

        tracing::debug!("Deleted {} at {}", id, blocks);
        Ok(blocks)
    }

    /// Free a range that must exactly match a live allocation
    pub fn release(&mut self, blocks: &Blocks) -> Result<AllocationId> {
        let id = self
            .live
            .get(&blocks.start())
            .copied()
            .filter(|id| self.ranges.get(id) == Some(blocks))
            .ok_or(BlockError::NotAllocated(*blocks))?;
        self.delete(id)?;
        Ok(id)
    }

    /// Resize an allocation to hold `new_size` bytes
    ///
    /// Shrinking frees the tail in place. Growth extends in place when the
    /// following gap is big enough. Otherwise the allocation moves to the
    /// best-fitting gap, and only when none fits does the store grow: under
    /// the allocation if it sits at the end, else by relocating it to the new
    /// space. Moves copy the first `preserve_len` bytes. The id never changes.
    pub fn resize(
        &mut self,
        buffer: &mut ByteBufferAllocator,
        id: AllocationId,
        new_size: usize,
        preserve_len: usize,
    ) -> Result<Blocks> {
        let current = self.blocks(id)?;
        let count = self.converter.blocks_for(new_size);

        if count == current.count() {
            return Ok(current);
        }

        if count < current.count() {
            let mut shrunk = current;
            shrunk.set_count(count);
            self.ranges.insert(id, shrunk);
            self.insert_free(Blocks::new(shrunk.end(), current.count() - count));
            tracing::debug!("Shrunk {} from {} to {}", id, current, shrunk);
            return Ok(shrunk);
        }

        let extra = count - current.count();
        let gap_len = self.free.get(&current.end()).map_or(0, Blocks::count);

        if gap_len < extra && current.end() + gap_len == self.total_blocks {
            // Last allocation in the store: reuse an existing gap before growing
            if let Some(target) = self.take_best_fit(count, None) {
                return self.move_to(buffer, id, current, target, preserve_len);
            }
            let copy_len = self.converter.to_bytes(self.high_water_mark());
            buffer.ensure_size(self.converter.to_bytes(current.start() + count), copy_len)?;
            self.extend_capacity(buffer.capacity_blocks());
        }

        if self.free.get(&current.end()).map_or(0, Blocks::count) >= extra {
            self.take_exact(current.end(), extra);
            let mut grown = current;
            grown.set_count(count);
            self.ranges.insert(id, grown);
            tracing::debug!("Grew {} in place from {} to {}", id, current, grown);
            return Ok(grown);
        }

        self.relocate(buffer, id, current, count, preserve_len)
    }

    fn relocate(
        &mut self,
        buffer: &mut ByteBufferAllocator,
        id: AllocationId,
        current: Blocks,
        count: usize,
        preserve_len: usize,
    ) -> Result<Blocks> {
        let target = match self.take_best_fit(count, None) {
            Some(target) => target,
            None => self.grow_for(buffer, count)?,
        };
        self.move_to(buffer, id, current, target, preserve_len)
    }

    /// Copy into an already carved-out `target` and retire `current`
    fn move_to(
        &mut self,
        buffer: &mut ByteBufferAllocator,
        id: AllocationId,
        current: Blocks,
        target: Blocks,
        preserve_len: usize,
    ) -> Result<Blocks> {
        let preserve = preserve_len.min(self.converter.to_bytes(current.count()));
        if let Err(e) = buffer.move_bytes(
            self.converter.byte_offset(current.start()),
            preserve,
            self.converter.byte_offset(target.start()),
        ) {
            self.insert_free(target);
            return Err(e);
        }

        self.live.remove(&current.start());
        self.insert_live(id, target);
        self.insert_free(current);

        tracing::debug!("Relocated {} from {} to {}", id, current, target);
        Ok(target)
    }

    /// Carve `count` blocks out of the best-fitting gap
    ///
    /// With `below`, only gaps starting under that block are considered.
    pub(super) fn take_best_fit(&mut self, count: usize, below: Option<usize>) -> Option<Blocks> {
        let limit = below.unwrap_or(usize::MAX);
        let start = self
            .free
            .values()
            .take_while(|gap| gap.start() < limit)
            .filter(|gap| gap.count() >= count)
            .min_by_key(|gap| gap.count())
            .map(Blocks::start)?;

        self.take_exact(start, count);
        Some(Blocks::new(start, count))
    }

    /// Carve `count` blocks off the front of the gap starting at `start`
    pub(super) fn take_exact(&mut self, start: usize, count: usize) {
        let gap = match self.free.remove(&start) {
            Some(gap) => gap,
            None => return,
        };
        debug_assert!(gap.count() >= count);

        if gap.count() > count {
            let rest = Blocks::new(start + count, gap.count() - count);
            self.free.insert(rest.start(), rest);
        }
        self.free_blocks -= count;
    }

    /// Grow the store so `count` blocks fit at its end, and take them
    fn grow_for(&mut self, buffer: &mut ByteBufferAllocator, count: usize) -> Result<Blocks> {
        let start = match self.free.values().next_back() {
            Some(gap) if gap.end() == self.total_blocks => gap.start(),
            _ => self.total_blocks,
        };

        let copy_len = self.converter.to_bytes(self.high_water_mark());
        buffer.ensure_size(self.converter.to_bytes(start + count), copy_len)?;
        self.extend_capacity(buffer.capacity_blocks());

        if self.free.get(&start).map_or(0, Blocks::count) < count {
            return Err(BlockError::Corrupted(format!(
                "store grew to {} blocks but gap at {} cannot hold {}",
                self.total_blocks, start, count
            )));
        }
        self.take_exact(start, count);
        Ok(Blocks::new(start, count))
    }

    /// Track a larger store; new blocks join the free set
    pub fn extend_capacity(&mut self, new_total_blocks: usize) {
        if new_total_blocks <= self.total_blocks {
            return;
        }

        let added = Blocks::new(self.total_blocks, new_total_blocks - self.total_blocks);
        self.total_blocks = new_total_blocks;
        self.insert_free(added);
    }

    pub(super) fn insert_live(&mut self, id: AllocationId, blocks: Blocks) {
        self.live.insert(blocks.start(), id);
        self.ranges.insert(id, blocks);
    }

    /// Add a free range, merging with the gaps on either side
    pub(super) fn insert_free(&mut self, blocks: Blocks) {
        if blocks.is_empty() {
            return;
        }
        self.free_blocks += blocks.count();

        let mut merged = blocks;
        if let Some((&prev_start, prev)) = self.free.range(..merged.start()).next_back() {
            if let Some(joined) = prev.coalesce(&merged) {
                merged = joined;
                self.free.remove(&prev_start);
            }
        }
        if let Some(next) = self.free.get(&merged.end()).copied() {
            if let Some(joined) = merged.coalesce(&next) {
                merged = joined;
                self.free.remove(&next.start());
            }
        }
        self.free.insert(merged.start(), merged);
    }

    /// Recompute the free set from the live table
    pub(super) fn rebuild_free(&mut self) {
        self.free.clear();
        self.free_blocks = 0;

        let mut cursor = 0;
        let live: Vec<Blocks> = self.live_ranges().map(|(_, b)| b).collect();
        for blocks in live {
            if blocks.start() > cursor {
                self.insert_free(Blocks::new(cursor, blocks.start() - cursor));
            }
            cursor = cursor.max(blocks.end());
        }
        if cursor < self.total_blocks {
            self.insert_free(Blocks::new(cursor, self.total_blocks - cursor));
        }
    }

    /// Verify that live and free ranges tile `[0, total_blocks)` exactly
    pub fn check_invariants(&self) -> Result<()> {
        if self.live.len() != self.ranges.len() {
            return Err(BlockError::Corrupted(format!(
                "{} live positions for {} ranges",
                self.live.len(),
                self.ranges.len()
            )));
        }

        let mut tiles: Vec<(Blocks, bool)> = self
            .live_ranges()
            .map(|(_, b)| (b, true))
            .chain(self.free_ranges().map(|b| (b, false)))
            .collect();
        tiles.sort_by_key(|(b, _)| b.start());

        let mut cursor = 0;
        let mut free_total = 0;
        let mut previous_free = false;
        for (blocks, is_live) in tiles {
            if blocks.is_empty() || blocks.start() != cursor {
                return Err(BlockError::Corrupted(format!(
                    "expected a range at block {}, found {}",
                    cursor, blocks
                )));
            }
            if !is_live {
                if previous_free {
                    return Err(BlockError::Corrupted(format!(
                        "uncoalesced free gap at {}",
                        blocks
                    )));
                }
                free_total += blocks.count();
            }
            previous_free = !is_live;
            cursor = blocks.end();
        }

        if cursor != self.total_blocks {
            return Err(BlockError::Corrupted(format!(
                "ranges end at {} but store has {} blocks",
                cursor, self.total_blocks
            )));
        }
        if free_total != self.free_blocks {
            return Err(BlockError::Corrupted(format!(
                "free counter {} but gaps hold {}",
                self.free_blocks, free_total
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BlockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockManager[block_size={}, total={}, live={}, used={}, free={}] live:",
            self.block_size(),
            self.total_blocks,
            self.live_count(),
            self.used_blocks(),
            self.free_blocks
        )?;
        for (_, blocks) in self.live_ranges() {
            write!(f, " {}", blocks)?;
        }
        f.write_str(" | free:")?;
        for blocks in self.free_ranges() {
            write!(f, " {}", blocks)?;
        }
        Ok(())
    }
}
