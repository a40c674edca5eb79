//! Per-user tooling: SpaceVim, asdf, fisher and the bundled dotfiles.
//!
//! These run once the account and the AUR helper exist. Everything that
//! lands in the home directory is created as the user so ownership is
//! right without a blanket `chown`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::common::{write_file, write_file_mode};
use crate::context::ProvisioningContext;
use crate::download;
use crate::process::{self, shell_quote, CommandSpec};

pub const SPACEVIM_LAYOUT_URL: &str =
    "https://raw.githubusercontent.com/SpaceVim/SpaceVim/master/mode/dark_powered.toml";
pub const SPACEVIM_INSTALLER_URL: &str = "https://spacevim.org/install.sh";
pub const ASDF_GIT: &str = "https://github.com/asdf-vm/asdf.git";
pub const FISHER_URL: &str = "https://git.io/fisher";

/// Fisher plugins, installed in order.
pub const FISHER_PLUGINS: &[&str] = &["jorgebucaran/fisher", "beckend/fish-plugin"];

/// Directory under the assets dir copied into the user's home.
pub const USER_HOME_ASSETS: &str = "user-home";

pub async fn setup_spacevim(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let user = &ctx.user.name;
    let home = &ctx.user.home;
    let config_dir = home.join(".SpaceVim.d");

    let layout = download::fetch_text(SPACEVIM_LAYOUT_URL).await?;
    write_file(config_dir.join("init.toml"), layout, true)?;
    process::execute(
        &CommandSpec::new("chown")
            .arg("-R")
            .arg(format!("{}:users", user))
            .arg_path(&config_dir),
    )
    .await?;

    tracing::info!("installing SpaceVim");
    let installer = format!(
        "curl -sLf {} | bash >/dev/null 2>&1",
        shell_quote(SPACEVIM_INSTALLER_URL)
    );
    process::execute(&CommandSpec::shell(installer).run_as(user)).await?;

    // root gets the same editor setup.
    let root_home = &ctx.paths.root_home;
    process::execute(&CommandSpec::shell(format!(
        "cp -r {}/.SpaceVim* {}",
        shell_quote(&home.to_string_lossy()),
        shell_quote(&root_home.to_string_lossy())
    )))
    .await?;
    process::execute(
        &CommandSpec::new("ln")
            .arg("-sf")
            .arg_path(&root_home.join(".SpaceVim"))
            .arg_path(&root_home.join(".vim")),
    )
    .await?;
    Ok(())
}

/// Shell script that clones asdf and links its fish completions.
pub fn asdf_script() -> String {
    [
        format!("git clone {} ~/.asdf", shell_quote(ASDF_GIT)),
        "mkdir -p ~/.config/fish/completions".to_string(),
        "ln -sf ~/.asdf/completions/asdf.fish ~/.config/fish/completions".to_string(),
    ]
    .join(" && ")
}

pub async fn setup_asdf(ctx: Arc<ProvisioningContext>) -> Result<()> {
    process::execute(&CommandSpec::shell(asdf_script()).run_as(&ctx.user.name)).await?;
    Ok(())
}

/// Bootstrap script run by bash that has a login fish install fisher and
/// its plugins.
pub fn fisher_script() -> String {
    let mut commands = vec![format!("curl -sL {} | source", FISHER_URL)];
    commands.extend(FISHER_PLUGINS.iter().map(|p| format!("fisher install {}", p)));
    commands.push("_beckend_plugins_install".to_string());
    format!("/usr/bin/fish -l -c {}\n", shell_quote(&commands.join(" && ")))
}

pub async fn setup_fisher(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let script = ctx.paths.tmp.join("install-fish.sh");
    // Readable by the user, who runs it second.
    write_file_mode(&script, fisher_script(), true, 0o644)?;

    let result = run_fisher(&script, &ctx.user.name).await;
    if let Err(e) = tokio::fs::remove_file(&script).await {
        tracing::warn!(path = %script.display(), "failed to remove bootstrap script: {}", e);
    }
    result
}

async fn run_fisher(script: &Path, user: &str) -> Result<()> {
    let bootstrap = CommandSpec::new("bash").arg("-x").arg_path(script);
    process::execute_sequence(&[bootstrap.clone(), bootstrap.run_as(user)]).await?;
    Ok(())
}

pub async fn post_user_setup(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let assets = ctx.config.assets_dir.join(USER_HOME_ASSETS);
    if !assets.is_dir() {
        bail!("dotfiles directory {} does not exist", assets.display());
    }

    let copy = CommandSpec::new("cp")
        .arg("-r")
        .arg(format!("{}/.", assets.display()))
        .arg_path(&ctx.user.home)
        .run_as(&ctx.user.name);
    process::execute(&copy)
        .await
        .with_context(|| format!("failed to copy {} into the home directory", assets.display()))?;
    tracing::info!(from = %assets.display(), "dotfiles copied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fisher_script() {
        let script = fisher_script();
        assert_eq!(
            script,
            "/usr/bin/fish -l -c 'curl -sL https://git.io/fisher | source \
             && fisher install jorgebucaran/fisher \
             && fisher install beckend/fish-plugin \
             && _beckend_plugins_install'\n"
        );
    }

    #[test]
    fn test_asdf_script() {
        let script = asdf_script();
        assert!(script.starts_with("git clone https://github.com/asdf-vm/asdf.git ~/.asdf && "));
        assert!(script.ends_with("~/.config/fish/completions"));
    }
}
