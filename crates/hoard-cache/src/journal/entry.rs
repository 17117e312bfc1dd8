//! Fixed-size journal entries.
//!
//! Every entry is 24 bytes, little-endian, with the type tag in the first byte:
//!
//! ```text
//! ChunkLocation   | tag | pad[3] | block_id u32 | block_offset u32 | cas_addr [12] |
//! Block operation | tag | pad[3] | block_id u32 | utc_micros i64   | pad[8]        |
//! ```

use thiserror::Error;

use crate::cas::{BlockId, CasAddr, CasLocation};

/// Encoded size of one entry
pub const ENTRY_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    None = 0,
    ChunkLocation = 1,
    BlockCreated = 2,
    BlockDeleted = 3,
    BlockAccess = 4,
}

impl EntryType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryType::None),
            1 => Some(EntryType::ChunkLocation),
            2 => Some(EntryType::BlockCreated),
            3 => Some(EntryType::BlockDeleted),
            4 => Some(EntryType::BlockAccess),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryDecodeError {
    #[error("unknown journal entry type {0}")]
    UnknownType(u8),
    #[error("journal entry must be {ENTRY_SIZE} bytes, got {0}")]
    BadLength(usize),
}

/// One CAS mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    /// Address now lives at `location`; an invalid location removes it
    ChunkLocation { location: CasLocation, addr: CasAddr },
    /// Block allocated and made the current append target
    BlockCreated { block_id: BlockId, utc_micros: i64 },
    /// Block file removed
    BlockDeleted { block_id: BlockId, utc_micros: i64 },
    /// Last access time of a block
    BlockAccess { block_id: BlockId, utc_micros: i64 },
}

impl JournalEntry {
    pub fn entry_type(&self) -> EntryType {
        match self {
            JournalEntry::ChunkLocation { .. } => EntryType::ChunkLocation,
            JournalEntry::BlockCreated { .. } => EntryType::BlockCreated,
            JournalEntry::BlockDeleted { .. } => EntryType::BlockDeleted,
            JournalEntry::BlockAccess { .. } => EntryType::BlockAccess,
        }
    }

    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0] = self.entry_type() as u8;

        match *self {
            JournalEntry::ChunkLocation { location, addr } => {
                out[4..8].copy_from_slice(&location.block_id.get().to_le_bytes());
                out[8..12].copy_from_slice(&location.block_offset.to_le_bytes());
                out[12..24].copy_from_slice(addr.as_bytes());
            }
            JournalEntry::BlockCreated { block_id, utc_micros }
            | JournalEntry::BlockDeleted { block_id, utc_micros }
            | JournalEntry::BlockAccess { block_id, utc_micros } => {
                out[4..8].copy_from_slice(&block_id.get().to_le_bytes());
                out[8..16].copy_from_slice(&utc_micros.to_le_bytes());
            }
        }

        out
    }

    /// Decode one entry. `Ok(None)` for zeroed (type `None`) entries, which replay skips.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, EntryDecodeError> {
        if bytes.len() != ENTRY_SIZE {
            return Err(EntryDecodeError::BadLength(bytes.len()));
        }

        let entry_type = EntryType::from_tag(bytes[0]).ok_or(EntryDecodeError::UnknownType(bytes[0]))?;
        let block_id = BlockId::new(read_u32(&bytes[4..8]));

        let entry = match entry_type {
            EntryType::None => return Ok(None),
            EntryType::ChunkLocation => {
                let mut addr = [0u8; CasAddr::SIZE];
                addr.copy_from_slice(&bytes[12..24]);
                JournalEntry::ChunkLocation {
                    location: CasLocation::new(block_id, read_u32(&bytes[8..12])),
                    addr: CasAddr::new(addr),
                }
            }
            EntryType::BlockCreated => JournalEntry::BlockCreated {
                block_id,
                utc_micros: read_i64(&bytes[8..16]),
            },
            EntryType::BlockDeleted => JournalEntry::BlockDeleted {
                block_id,
                utc_micros: read_i64(&bytes[8..16]),
            },
            EntryType::BlockAccess => JournalEntry::BlockAccess {
                block_id,
                utc_micros: read_i64(&bytes[8..16]),
            },
        };

        Ok(Some(entry))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    i64::from_le_bytes(buf)
}
