//! Core data types for the install cache.
//!
//! This module provides the identifiers shared between the cache and the
//! streaming layer that drives it:
//! - ChunkId, the opaque id the streaming layer resolves through its manifest
//! - CompressionFormat, part of the encoding parameters of a chunk

pub mod chunk;

// Re-export all public types
pub use chunk::{ChunkId, CompressionFormat};
