//! Content-Addressable Storage implementation
//!
//! Chunks are packed into numbered block files under `<root>/blocks/` and
//! located through an in-memory index keyed by [`CasAddr`]. The index is
//! rebuilt from the journal at startup.

pub mod block;
pub mod hash;
pub mod index;
pub mod reader;
pub mod store;

// Re-export main types
pub use block::{BlockId, BlockInfo, BlockInfoMap, CasLocation, BLOCK_EXTENSION};
pub use hash::{compute_hash, hash_file, read_and_hash_files, CasAddr, ContentHash};
pub use index::CasIndex;
pub use reader::BlockReader;
pub use store::{Cas, ChunkLookup, VerifyReport};
