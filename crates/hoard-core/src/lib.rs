//! # hoard-core
//!
//! Core types and utilities shared across all Hoard crates.
//!
//! This crate provides:
//! - HoardError enum for unified error handling
//! - ChunkId and CompressionFormat, the identifiers the streaming layer hands us
//! - Utility functions for hashing, byte sizes and timestamps
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (ChunkId, CompressionFormat)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{HoardError, HoardResult};
pub use types::{ChunkId, CompressionFormat};
