//! Shared utilities (output-file writing).

#[cfg(feature = "cli")]
pub mod fs;
