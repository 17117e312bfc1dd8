//! Block identifiers, chunk locations and block scan results.

use std::collections::HashMap;
use std::fmt;

/// File extension of block files
pub const BLOCK_EXTENSION: &str = "ucas";

/// Identifies one block file under `blocks/`. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(u32);

impl BlockId {
    pub const INVALID: BlockId = BlockId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// `0000002a.ucas`: the id as big-endian lower case hex
    pub fn file_name(self) -> String {
        format!("{}.{}", hex::encode(self.0.to_be_bytes()), BLOCK_EXTENSION)
    }

    /// Inverse of [`BlockId::file_name`]. Returns `None` for foreign or invalid names.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(BLOCK_EXTENSION)?.strip_suffix('.')?;
        if stem.is_empty() || stem.len() > 8 {
            return None;
        }
        let id = u32::from_str_radix(stem, 16).ok()?;
        Some(Self(id)).filter(|id| id.is_valid())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a chunk's bytes live: a block and a byte offset inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasLocation {
    pub block_id: BlockId,
    pub block_offset: u32,
}

impl CasLocation {
    /// Journaled to mean "this address no longer has a location"
    pub const INVALID: CasLocation = CasLocation {
        block_id: BlockId::INVALID,
        block_offset: u32::MAX,
    };

    pub fn new(block_id: BlockId, block_offset: u32) -> Self {
        Self {
            block_id,
            block_offset,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.block_id.is_valid() && self.block_offset != u32::MAX
    }
}

impl Default for CasLocation {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Ephemeral per-block facts gathered for purge and verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    /// Size of the block file on disk
    pub file_size: u64,
    /// Last access in microseconds since the epoch, 0 when never tracked
    pub last_access: i64,
    /// Live references into this block
    pub ref_count: u32,
}

pub type BlockInfoMap = HashMap<BlockId, BlockInfo>;
