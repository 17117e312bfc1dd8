//! Shared read handle for a block file.
//!
//! Reads are positional so one handle serves any number of concurrent
//! readers without a lock or a shared cursor.

use camino::Utf8Path;
use hoard_core::error::HoardError;
use std::fs::File;
use std::io;

use super::BlockId;
use crate::CacheResult;

/// Open read-only handle to one block, shared through `Arc` and cached as `Weak`
#[derive(Debug)]
pub struct BlockReader {
    block_id: BlockId,
    file: File,
}

impl BlockReader {
    pub fn open(block_id: BlockId, path: &Utf8Path) -> CacheResult<Self> {
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        Ok(Self { block_id, file })
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Read exactly `len` bytes starting at `offset`
    pub fn read_at(&self, offset: u64, len: usize) -> CacheResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, &mut buf, offset).map_err(|e| {
            HoardError::io(
                format!(
                    "Failed to read {} bytes at offset {} in CAS block {}",
                    len, offset, self.block_id
                ),
                e,
            )
        })?;
        Ok(buf)
    }
}

/// Map a failed open to `BlockNotFound` when the file is gone
pub(crate) fn open_error(path: &Utf8Path, e: io::Error) -> HoardError {
    if e.kind() == io::ErrorKind::NotFound {
        HoardError::BlockNotFound {
            path: path.to_string(),
        }
    } else {
        HoardError::io(format!("Failed to open CAS block '{}'", path), e)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
