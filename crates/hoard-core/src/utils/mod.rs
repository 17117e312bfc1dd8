//! Utility functions and helpers.
//!
//! Common functionality used across multiple Hoard crates.

pub mod size;
pub mod time;

// Re-export commonly used utilities
pub use size::{format_bytes, parse_size, to_kib, to_mib};
pub use time::utc_now_micros;
