//! setup-image library exports.
//!
//! The binary is a thin CLI over these modules; integration tests under
//! `tests/` drive them directly.

pub mod commands;
pub mod common;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod preflight;
pub mod process;
pub mod steps;
pub mod task;
pub mod timing;

pub use error::{Error, Result};
