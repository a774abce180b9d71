//! Layout and fragmentation diagnostics

use super::manager::BlockManager;
use super::AllocationId;
use crate::blocks::Blocks;
use crate::storage::BlockStorageKind;
use serde::{Deserialize, Serialize};

/// Snapshot of allocator usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationStats {
    pub storage: BlockStorageKind,
    pub block_size: usize,
    pub capacity_bytes: usize,
    pub total_blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub live_allocations: usize,
    pub free_gaps: usize,
    pub largest_free_gap: usize,
    pub fragmentation: f64,
}

/// One tile of the physical layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LayoutEntry {
    Live { id: AllocationId, blocks: Blocks },
    Free { blocks: Blocks },
}

impl LayoutEntry {
    pub fn blocks(&self) -> Blocks {
        match self {
            LayoutEntry::Live { blocks, .. } | LayoutEntry::Free { blocks } => *blocks,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, LayoutEntry::Live { .. })
    }
}

impl BlockManager {
    pub fn stats(&self, storage: BlockStorageKind, capacity_bytes: usize) -> AllocationStats {
        AllocationStats {
            storage,
            block_size: self.block_size(),
            capacity_bytes,
            total_blocks: self.total_blocks(),
            used_blocks: self.used_blocks(),
            free_blocks: self.free_blocks(),
            live_allocations: self.live_count(),
            free_gaps: self.gap_count(),
            largest_free_gap: self.largest_gap(),
            fragmentation: self.fragmentation_score(),
        }
    }

    /// Live and free ranges in address order
    pub fn layout(&self) -> Vec<LayoutEntry> {
        let mut entries: Vec<LayoutEntry> = self
            .live_ranges()
            .map(|(id, blocks)| LayoutEntry::Live { id, blocks })
            .chain(self.free_ranges().map(|blocks| LayoutEntry::Free { blocks }))
            .collect();
        entries.sort_by_key(|entry| entry.blocks().start());
        entries
    }
}
