//! Install cache for Hoard
//!
//! Content chunks are packed into append-only block files and located by a
//! content-addressed index. Every change to the index is recorded in a
//! journal first, so the cache survives crashes and restarts. The
//! [`InstallCache`] ties the pieces together: it queues and flushes chunks,
//! evicts unreferenced blocks to stay within a disk quota and serves reads
//! to the I/O dispatcher as an [`IoBackend`].

pub mod cas;
pub mod encoding;
pub mod install;
pub mod journal;
pub mod pending;
pub mod provider;
pub mod request;

// Re-export main types
pub use cas::{compute_hash, BlockId, Cas, CasAddr, CasLocation, ContentHash, VerifyReport};
pub use encoding::{chunk_range, ChunkDecoder, DecodingParams, OffsetAndLength, PassthroughDecoder};
pub use install::{InstallCache, PurgeReport, StorageUsage};
pub use journal::{Journal, JournalEntry, Transaction};
pub use pending::PendingChunks;
pub use provider::{ChunkInfo, ContainerReferences, ContentProvider, StaticContentProvider};
pub use request::{BackendContext, IoBackend, IoRequest, ReadOptions};

use hoard_core::error::HoardError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, HoardError>;
