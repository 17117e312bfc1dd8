//! Terminal output formatting.
//!
//! Human readable lines go to stdout with optional colors; `--json` output is
//! printed uncolored so it can be piped.

pub mod colors;
pub mod errors;

use serde::Serialize;

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{}", message);
    }

    /// Print an aligned `key: value` line
    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        println!("{} {}", self.colors.dim(&format!("{:<16}", format!("{}:", key))), value);
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// Pretty-printed JSON on stdout
    pub fn json<T: Serialize>(&self, value: &T) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
