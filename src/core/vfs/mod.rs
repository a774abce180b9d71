//! In-memory virtual filesystem
//!
//! Maps normalised paths to [`MappedBytes`] records so generated files can be
//! written, read back and discarded without touching disk. Each path owns
//! exactly one record; rewriting a file reuses its record.

#[cfg(test)]
mod tests;

use crate::config::MapperConfig;
use crate::error::{BlockError, Result};
use crate::mapper::{BlockMapper, MappedBytes};
use crate::stream::{MappedBytesReader, MappedBytesWriter};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Path-keyed file store over a [`BlockMapper`]
pub struct MemoryFileSystem {
    mapper: BlockMapper,
    files: RwLock<BTreeMap<String, MappedBytes>>,
}

impl MemoryFileSystem {
    pub fn new(mapper: BlockMapper) -> Self {
        MemoryFileSystem {
            mapper,
            files: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_config(config: MapperConfig) -> Result<Self> {
        Ok(Self::new(BlockMapper::new(config)?))
    }

    pub fn mapper(&self) -> &BlockMapper {
        &self.mapper
    }

    /// Create or replace a file
    pub fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = normalize_path(path)?;
        tracing::debug!("Writing {} bytes to {}", content.len(), path);

        let mut files = self.files.write();
        match files.get(&path) {
            Some(bytes) => bytes.set_bytes(content),
            None => {
                let bytes = self.mapper.allocate(content)?;
                files.insert(path, bytes);
                Ok(())
            }
        }
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.handle(path)?.get_bytes()
    }

    /// Reader over the file as it is now
    pub fn open_read(&self, path: &str) -> Result<MappedBytesReader> {
        self.handle(path)?.open_input_stream()
    }

    /// Writer that replaces the file's content, creating the file if needed
    pub fn open_write(&self, path: &str) -> Result<MappedBytesWriter> {
        let path = normalize_path(path)?;
        let mut files = self.files.write();
        let bytes = match files.get(&path) {
            Some(bytes) => bytes.clone(),
            None => {
                let bytes = self.mapper.allocate(&[])?;
                files.insert(path, bytes.clone());
                bytes
            }
        };
        bytes.open_output_stream()
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        tracing::debug!("Deleting {}", path);

        let bytes = self
            .files
            .write()
            .remove(&path)
            .ok_or(BlockError::FileNotFound(path))?;
        bytes.delete()
    }

    pub fn exists(&self, path: &str) -> bool {
        match normalize_path(path) {
            Ok(path) => self.files.read().contains_key(&path),
            Err(_) => false,
        }
    }

    /// Size of a file in bytes
    pub fn len(&self, path: &str) -> Result<usize> {
        self.handle(path)?.size()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// All files under `prefix`, sorted
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = normalize_path(prefix).or_else(|e| match prefix.trim_matches('/') {
            "" => Ok(String::new()),
            _ => Err(e),
        })?;
        let dir = format!("{}/", prefix);

        Ok(self
            .files
            .read()
            .keys()
            .filter(|path| prefix.is_empty() || path.starts_with(&dir) || **path == prefix)
            .cloned()
            .collect())
    }

    /// Fully defragment the underlying store; returns records moved
    pub fn compact(&self) -> Result<usize> {
        self.mapper.full_defrag()
    }

    fn handle(&self, path: &str) -> Result<MappedBytes> {
        let path = normalize_path(path)?;
        self.files
            .read()
            .get(&path)
            .cloned()
            .ok_or(BlockError::FileNotFound(path))
    }
}

/// Canonical form of a file path: leading `/`, no empty, `.` or `..` segments
pub fn normalize_path(path: &str) -> Result<String> {
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(BlockError::InvalidPath(path.to_string()));
        }
        normalized.push('/');
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        return Err(BlockError::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}
