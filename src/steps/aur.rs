//! The AUR helper (paru) and everything installed through it.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::context::ProvisioningContext;
use crate::process::{self, CommandSpec};

pub const PARU_PACKAGE: &str = "paru";
pub const PARU_GIT: &str = "https://aur.archlinux.org/paru-bin.git";

/// Build steps for an AUR package from `git_url`, all as `user`.
pub fn build_commands(user: &str, git_url: &str, work_dir: &Path) -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("git")
            .arg("clone")
            .arg(git_url)
            .arg_path(work_dir)
            .run_as(user),
        CommandSpec::new("makepkg")
            .args(["-si", "--noconfirm"])
            .dir(work_dir)
            .run_as(user),
    ]
}

async fn remove_work_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", dir.display())),
    }
}

pub async fn install_aur_helper(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let user = &ctx.user.name;
    let work_dir = ctx.paths.tmp.join(format!("install-aur-{}", PARU_PACKAGE));

    // Leftovers from an interrupted run would make the clone fail.
    remove_work_dir(&work_dir).await?;
    let built = process::execute_sequence(&build_commands(user, PARU_GIT, &work_dir)).await;
    remove_work_dir(&work_dir).await?;
    built.with_context(|| format!("failed to build {} from {}", PARU_PACKAGE, PARU_GIT))?;

    let gendb = CommandSpec::new(ctx.commands.aur_program())
        .arg("--gendb")
        .run_as(user);
    process::execute(&gendb).await?;

    tracing::info!(helper = PARU_PACKAGE, "AUR helper installed");
    Ok(())
}

pub async fn install_aur_packages(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let packages = &ctx.config.aur_packages;
    if packages.is_empty() {
        tracing::info!("no AUR packages configured");
        return Ok(());
    }
    process::execute(&ctx.commands.aur_install(&ctx.user.name, packages)).await?;
    tracing::info!(count = packages.len(), "AUR packages installed");
    Ok(())
}
