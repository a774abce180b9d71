//! Streaming access to mapped records

use crate::allocator::AllocationId;
use crate::error::Result;
use crate::mapper::MappedBytes;
use std::io::{self, BufRead, Cursor, Read, Write};

/// Reader over a snapshot of a record taken when the stream was opened
#[derive(Debug)]
pub struct MappedBytesReader {
    id: AllocationId,
    snapshot: Cursor<Vec<u8>>,
}

impl MappedBytesReader {
    pub(crate) fn new(id: AllocationId, snapshot: Vec<u8>) -> Self {
        MappedBytesReader {
            id,
            snapshot: Cursor::new(snapshot),
        }
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    /// Total length of the snapshot
    pub fn len(&self) -> usize {
        self.snapshot.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        self.len()
            .saturating_sub(self.snapshot.position() as usize)
    }
}

impl Read for MappedBytesReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.snapshot.read(buf)
    }
}

impl BufRead for MappedBytesReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.snapshot.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.snapshot.consume(amt)
    }
}

/// Writer that replaces a record's content with everything written so far
///
/// Content is committed on [`flush`](Write::flush), [`close`](Self::close), or
/// drop. Errors during a drop commit can only be logged, so prefer `close`.
pub struct MappedBytesWriter {
    target: MappedBytes,
    buffer: Vec<u8>,
    dirty: bool,
}

impl MappedBytesWriter {
    pub(crate) fn new(target: MappedBytes) -> Self {
        MappedBytesWriter {
            target,
            buffer: Vec::new(),
            // An opened-and-closed stream still truncates the record
            dirty: true,
        }
    }

    pub fn target(&self) -> &MappedBytes {
        &self.target
    }

    fn commit(&mut self) -> Result<()> {
        if self.dirty {
            self.target.set_bytes(&self.buffer)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Commit pending content and surface any error
    pub fn close(mut self) -> Result<()> {
        self.commit()
    }
}

impl Write for MappedBytesWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit().map_err(io::Error::from)
    }
}

impl Drop for MappedBytesWriter {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!(
                "Dropped output stream for {} without committing: {}",
                self.target.id(),
                e
            );
        }
    }
}

impl std::fmt::Debug for MappedBytesWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedBytesWriter")
            .field("target", &self.target.id())
            .field("buffered", &self.buffer.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
