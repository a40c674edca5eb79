//! Setup command - provisions the image.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::context::{self, ProvisioningContext};
use crate::preflight;
use crate::steps;

/// Execute the setup command.
///
/// Any step failure comes back as an error naming the step, which `main`
/// turns into a non-zero exit.
pub async fn cmd_setup(config: &Config, user_name: &str, skip_preflight: bool) -> Result<()> {
    if skip_preflight {
        tracing::warn!("preflight checks skipped");
    } else {
        preflight::run_preflight_or_fail(config, Some(user_name))?;
    }

    let arch = context::detect_arch()
        .await
        .context("failed to detect machine architecture")?;
    let ctx = ProvisioningContext::new(user_name, &arch, config)?;

    let report = steps::provision(ctx).await?;
    report.print();
    Ok(())
}
