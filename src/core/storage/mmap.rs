//! Memory-mapped store over an anonymous temp file

use super::{BackingStore, BlockStorageKind};
use crate::error::Result;
use memmap2::MmapMut;
use std::fs::File;
use std::path::Path;

/// Backing store over a shared mapping of an unlinked temp file
///
/// The file has no name on disk and disappears with the store. Growth extends
/// the file and remaps it, so the whole old content survives regardless of
/// `copy_len`.
pub struct MmapStore {
    file: File,
    map: MmapMut,
}

impl MmapStore {
    /// Create a store of `len` bytes, in `dir` if given or the system temp dir
    pub fn new(len: usize, dir: Option<&Path>) -> Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        // Empty mappings are rejected on some platforms
        file.set_len(len.max(1) as u64)?;

        // SAFETY: the file is private to this store (unlinked, never shared) and
        // is only resized through `grow`, which replaces the mapping afterwards.
        let map = unsafe { MmapMut::map_mut(&file)? };

        Ok(MmapStore { file, map })
    }
}

impl BackingStore for MmapStore {
    fn kind(&self) -> BlockStorageKind {
        BlockStorageKind::MappedFile
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn grow(&mut self, new_len: usize, _copy_len: usize) -> Result<()> {
        if new_len <= self.map.len() {
            return Ok(());
        }

        self.file.set_len(new_len as u64)?;
        // SAFETY: see `new`; the old mapping is dropped on assignment.
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        tracing::debug!("Remapped backing file to {} bytes", new_len);
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl std::fmt::Debug for MmapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapStore")
            .field("len", &self.map.len())
            .finish()
    }
}
