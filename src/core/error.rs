use crate::allocator::AllocationId;
use crate::blocks::Blocks;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Out of bounds: {len} bytes at offset {start} exceed capacity {capacity}")]
    OutOfBounds {
        start: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Range {0} is not a live allocation")]
    NotAllocated(Blocks),

    #[error("Unknown allocation: {0}")]
    UnknownAllocation(AllocationId),

    #[error("Mapped bytes {0} have been deleted")]
    Deleted(AllocationId),

    #[error("Capacity exceeded: requested {requested} bytes, limit is {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("Allocation table inconsistent: {0}")]
    Corrupted(String),

    #[error("Checksum verification failed for {0}")]
    ChecksumMismatch(AllocationId),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BlockError>;

impl From<BlockError> for std::io::Error {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Io(e) => e,
            BlockError::OutOfBounds { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
            }
            BlockError::Deleted(_) | BlockError::FileNotFound(_) => {
                std::io::Error::new(std::io::ErrorKind::NotFound, err)
            }
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
