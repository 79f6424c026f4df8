//! CLI command implementations.

pub mod import;

pub use import::{handle_import, ImportConfig};
