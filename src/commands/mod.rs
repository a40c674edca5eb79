//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `setup` - Provision the image for a user
//! - `preflight` - Run preflight checks
//! - `show` - Display the step plan or configuration

mod preflight;
pub mod setup;
pub mod show;

pub use preflight::cmd_preflight;
pub use setup::cmd_setup;
pub use show::cmd_show;
