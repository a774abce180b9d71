//! Block allocation over a growable backing store
//!
//! - [`buffer`] - physical byte access, growth and overlap-safe moves
//! - [`manager`] - live/free block tables, allocation and resize
//! - [`defrag`] - simple and full compaction
//! - [`stats`] - layout and fragmentation diagnostics

pub mod buffer;
pub mod defrag;
pub mod manager;
pub mod stats;

pub use buffer::ByteBufferAllocator;
pub use manager::BlockManager;
pub use stats::{AllocationStats, LayoutEntry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of one allocation
///
/// The id survives resizes and relocations; only the range it maps to moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationId(u64);

impl AllocationId {
    pub(crate) fn new(raw: u64) -> Self {
        AllocationId(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
