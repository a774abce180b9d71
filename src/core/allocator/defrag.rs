//! Compaction of live allocations
//!
//! Both passes move bytes first and update the tables afterwards. When a
//! move fails nothing about that step has been recorded, so the tables keep
//! describing where the bytes really are.

use super::buffer::ByteBufferAllocator;
use super::manager::BlockManager;
use super::AllocationId;
use crate::blocks::Blocks;
use crate::error::Result;

impl BlockManager {
    /// Cheap, bounded compaction
    ///
    /// Each step first tries to drop the highest allocation into a lower
    /// best-fit gap; when nothing fits it slides the allocation right after the
    /// lowest gap down into that gap. Stops after `max_moves` steps or when no
    /// gap sits below a live allocation. Returns the number of moves.
    pub fn simple_defrag(
        &mut self,
        buffer: &mut ByteBufferAllocator,
        max_moves: usize,
    ) -> Result<usize> {
        let mut moves = 0;
        while moves < max_moves {
            if !self.relocate_tail(buffer)? && !self.slide_into_first_gap(buffer)? {
                break;
            }
            moves += 1;
        }

        if moves > 0 {
            tracing::info!(
                "Simple defrag made {} moves, {} gaps left, fragmentation {:.3}",
                moves,
                self.gap_count(),
                self.fragmentation_score()
            );
        }
        Ok(moves)
    }

    /// Move the highest live allocation into a gap below it
    fn relocate_tail(&mut self, buffer: &mut ByteBufferAllocator) -> Result<bool> {
        let id = match self.live.values().next_back() {
            Some(id) => *id,
            None => return Ok(false),
        };
        let tail = self.blocks(id)?;

        let target = match self.take_best_fit(tail.count(), Some(tail.start())) {
            Some(target) => target,
            None => return Ok(false),
        };

        if let Err(e) = buffer.move_blocks(&tail, target.start()) {
            self.insert_free(target);
            return Err(e);
        }

        self.migrate_window(tail, target.start());
        self.insert_free(tail);
        tracing::debug!("Defrag moved tail {} from {} to {}", id, tail, target);
        Ok(true)
    }

    /// Slide the allocation that directly follows the lowest gap down into it
    fn slide_into_first_gap(&mut self, buffer: &mut ByteBufferAllocator) -> Result<bool> {
        let found = self
            .free
            .values()
            .find_map(|gap| self.live.get(&gap.end()).map(|id| (*gap, *id)));
        let (gap, id) = match found {
            Some(found) => found,
            None => return Ok(false),
        };
        let blocks = self.blocks(id)?;

        // Source and destination overlap whenever the allocation outsizes the gap
        buffer.move_blocks(&blocks, gap.start())?;

        self.take_exact(gap.start(), gap.count());
        self.migrate_window(blocks, gap.start());
        self.insert_free(Blocks::new(gap.start() + blocks.count(), gap.count()));
        tracing::debug!("Defrag slid {} from {} to {}", id, blocks, gap.start());
        Ok(true)
    }

    /// Full compaction into a contiguous prefix
    ///
    /// Live allocations keep their relative order. Each maximal run of
    /// touching allocations is moved with a single copy. Afterwards all free
    /// space is one trailing gap. Returns the number of allocations moved.
    pub fn full_defrag(&mut self, buffer: &mut ByteBufferAllocator) -> Result<usize> {
        let result = self.compact_runs(buffer);
        // Also after a failed move: the live table is already accurate
        self.rebuild_free();

        if let Ok(moved) = &result {
            tracing::info!(
                "Full defrag moved {} allocations, {} blocks live, {} free",
                moved,
                self.used_blocks(),
                self.free_blocks
            );
        }
        result
    }

    fn compact_runs(&mut self, buffer: &mut ByteBufferAllocator) -> Result<usize> {
        let order: Vec<Blocks> = self.live_ranges().map(|(_, b)| b).collect();
        let mut cursor = 0;
        let mut moved = 0;

        let mut i = 0;
        while i < order.len() {
            let first = order[i];
            let mut run_end = first.end();
            let mut j = i + 1;
            while j < order.len() && order[j].start() == run_end {
                run_end = order[j].end();
                j += 1;
            }

            let run = Blocks::new(first.start(), run_end - first.start());
            if run.start() != cursor {
                buffer.move_blocks(&run, cursor)?;
                moved += self.migrate_window(run, cursor);
            }
            cursor += run.count();
            i = j;
        }
        Ok(moved)
    }

    /// Re-point every allocation inside `window` after it moved to `to_start`
    ///
    /// Returns how many allocations migrated.
    pub(super) fn migrate_window(&mut self, window: Blocks, to_start: usize) -> usize {
        let affected: Vec<(usize, AllocationId)> = self
            .live
            .range(window.start()..window.end())
            .map(|(start, id)| (*start, *id))
            .collect();

        // Drop all old keys first; new positions may collide with old ones
        for (start, _) in &affected {
            self.live.remove(start);
        }

        let mut migrated = 0;
        for (_, id) in affected {
            if let Some(blocks) = self.ranges.get_mut(&id) {
                if blocks.maybe_migrate(window.start(), window.count(), to_start, window.count()) {
                    migrated += 1;
                }
                self.live.insert(blocks.start(), id);
            }
        }
        migrated
    }
}
