//! Block engine internals
//!
//! Layering, bottom up: [`blocks`] ranges, [`storage`] backends, the
//! [`allocator`] (byte buffer plus allocation table and defragmentation),
//! then [`mapper`] handles, [`stream`] adapters and the [`vfs`] on top.

pub mod allocator;
pub mod blocks;
pub mod config;
pub mod error;
pub mod mapper;
pub mod storage;
pub mod stream;
pub mod vfs;

pub use allocator::{AllocationId, AllocationStats, LayoutEntry};
pub use blocks::Blocks;
pub use config::MapperConfig;
pub use error::{BlockError, Result};
pub use mapper::{BlockMapper, MappedBytes};
pub use storage::BlockStorageKind;
pub use stream::{MappedBytesReader, MappedBytesWriter};
pub use vfs::MemoryFileSystem;
