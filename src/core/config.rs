//! Mapper configuration
//!
//! Configuration can be built in code, through [`crate::BlockMapperBuilder`],
//! or loaded from TOML:
//!
//! ```toml
//! block_size = 128
//! initial_blocks = 64
//! storage = "mapped_file"
//! auto_defrag = true
//! defrag_threshold = 0.5
//! ```

use crate::error::{BlockError, Result};
use crate::storage::BlockStorageKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_BLOCK_SIZE: usize = 64;
pub const DEFAULT_INITIAL_BLOCKS: usize = 16;
pub const DEFAULT_DEFRAG_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SIMPLE_DEFRAG_MOVES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Bytes per block
    pub block_size: usize,

    /// Blocks the store starts with
    pub initial_blocks: usize,

    pub storage: BlockStorageKind,

    /// Where mapped-file stores create their temp file (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Hard cap on physical store size
    pub max_bytes: Option<usize>,

    /// Run a simple defrag after deletes once fragmentation passes the threshold
    pub auto_defrag: bool,

    /// Fragmentation score (0.0..1.0) that triggers auto defrag
    pub defrag_threshold: f64,

    /// Move budget for each simple defrag pass
    pub simple_defrag_max_moves: usize,

    /// Keep a CRC32 per record and verify it on every read
    pub verify_checksums: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            initial_blocks: DEFAULT_INITIAL_BLOCKS,
            storage: BlockStorageKind::Heap,
            temp_dir: None,
            max_bytes: None,
            auto_defrag: true,
            defrag_threshold: DEFAULT_DEFRAG_THRESHOLD,
            simple_defrag_max_moves: DEFAULT_SIMPLE_DEFRAG_MOVES,
            verify_checksums: false,
        }
    }
}

impl MapperConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: MapperConfig =
            toml::from_str(s).map_err(|e| BlockError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BlockError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(BlockError::InvalidBlockSize(self.block_size));
        }
        if !(0.0..=1.0).contains(&self.defrag_threshold) {
            return Err(BlockError::Config(format!(
                "defrag_threshold must be within 0.0..=1.0, got {}",
                self.defrag_threshold
            )));
        }
        let initial = self.initial_bytes()?;
        if let Some(max) = self.max_bytes {
            if max < initial {
                return Err(BlockError::Config(format!(
                    "max_bytes {} is below the initial store size {}",
                    max, initial
                )));
            }
        }
        Ok(())
    }

    /// Physical size of a fresh store; never less than one block
    pub fn initial_bytes(&self) -> Result<usize> {
        self.block_size
            .checked_mul(self.initial_blocks.max(1))
            .ok_or_else(|| {
                BlockError::Config(format!(
                    "initial store of {} blocks of {} bytes overflows",
                    self.initial_blocks, self.block_size
                ))
            })
    }
}
