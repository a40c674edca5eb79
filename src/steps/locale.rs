//! Locale and console keymap.

use std::sync::Arc;

use anyhow::Result;

use crate::common::write_file;
use crate::context::ProvisioningContext;
use crate::process::{self, CommandSpec};

pub const LOCALE: &str = "en_US.UTF-8";
pub const KEYMAP: &str = "us";

pub async fn handle_locale(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let etc = &ctx.paths.etc;

    write_file(etc.join("locale.conf"), format!("LANG={}\n", LOCALE), true)?;
    write_file(etc.join("vconsole.conf"), format!("KEYMAP={}\n", KEYMAP), true)?;

    // locale-gen reads locale.gen, so it has to be in place first.
    write_file(etc.join("locale.gen"), format!("{} UTF-8\n", LOCALE), true)?;
    process::execute(&CommandSpec::new("locale-gen")).await?;

    tracing::info!(locale = LOCALE, keymap = KEYMAP, "locale configured");
    Ok(())
}
