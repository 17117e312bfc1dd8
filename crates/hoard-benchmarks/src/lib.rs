//! Hoard benchmarking suite
//!
//! Benchmarks for chunk hashing, flushing chunks into CAS blocks, journal
//! commit and replay, and eviction.

pub mod common;

pub use common::*;
