//! Provisioning environment checks (privileges, config files, assets).

use std::path::Path;

use crate::config::Config;
use crate::context::{validate_user_name, SystemPaths};
use crate::steps::{tini, user_setup};

use super::types::CheckResult;

/// Check the environment the steps will run in.
pub fn check_environment(config: &Config, user_name: Option<&str>) -> Vec<CheckResult> {
    let paths = SystemPaths::under(Path::new("/"));
    let mut results = vec![
        check_root(),
        check_arch(std::env::consts::ARCH),
        check_file("pacman.conf", &paths.pacman_conf),
        check_file("makepkg.conf", &paths.makepkg_conf),
        check_assets(&config.assets_dir),
    ];
    if let Some(name) = user_name {
        results.push(check_user_name(name));
    }
    results
}

fn check_root() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        CheckResult::pass("running as root")
    } else {
        CheckResult::fail(
            "running as root",
            &format!("effective uid is {}; user and package setup need root", euid),
        )
    }
}

fn check_arch(arch: &str) -> CheckResult {
    match tini::asset_for_arch(arch) {
        Ok(asset) => CheckResult::pass_with("architecture", &format!("{} ({})", arch, asset)),
        Err(e) => CheckResult::fail("architecture", &e.to_string()),
    }
}

fn check_file(name: &str, path: &Path) -> CheckResult {
    if path.is_file() {
        CheckResult::pass_with(name, &path.display().to_string())
    } else {
        CheckResult::fail(name, &format!("{} not found; it is edited in place", path.display()))
    }
}

fn check_assets(assets_dir: &Path) -> CheckResult {
    let dotfiles = assets_dir.join(user_setup::USER_HOME_ASSETS);
    if dotfiles.is_dir() {
        CheckResult::pass_with("dotfiles", &dotfiles.display().to_string())
    } else {
        CheckResult::fail(
            "dotfiles",
            &format!(
                "{} not found. Set SETUP_ASSETS_DIR to the directory holding {}/",
                dotfiles.display(),
                user_setup::USER_HOME_ASSETS
            ),
        )
    }
}

fn check_user_name(name: &str) -> CheckResult {
    match validate_user_name(name) {
        Ok(()) => CheckResult::pass_with("user name", name),
        Err(e) => CheckResult::fail("user name", &e.to_string()),
    }
}
