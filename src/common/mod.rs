//! Shared utilities across setup-image modules.

pub mod files;

pub use files::{modify_file, write_file, write_file_mode, EditOutcome, Transform};
