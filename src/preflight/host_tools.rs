//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the provisioning steps invoke: (binary, package, purpose).
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("pacman", "pacman", "Installs the initial packages"),
    ("runuser", "util-linux", "Runs user steps as the provisioned user"),
    ("groupadd", "shadow", "Creates the user's primary group"),
    ("useradd", "shadow", "Creates the provisioned user"),
    ("chsh", "util-linux", "Sets root's login shell"),
    ("locale-gen", "glibc", "Generates the configured locale"),
    ("uname", "coreutils", "Detects the machine architecture"),
    ("chown", "coreutils", "Fixes ownership of the SpaceVim config"),
    ("cp", "coreutils", "Copies dotfiles into the home directory"),
    ("ln", "coreutils", "Links root's vim config"),
    ("bash", "bash", "Runs the fisher bootstrap script"),
    ("curl", "curl", "Fetches the SpaceVim and fisher installers"),
];

/// Tools that only become necessary after earlier steps ran.
const LATER_TOOLS: &[(&str, &str, &str)] = &[
    ("git", "git", "Installed with the initial packages"),
    ("makepkg", "pacman", "Builds the AUR helper; part of base-devel"),
    ("fish", "fish", "Login shell for root and the user"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let required = REQUIRED_TOOLS
        .iter()
        .map(|&(tool, package, purpose)| check_tool_exists(tool, package, purpose, true));
    let later = LATER_TOOLS
        .iter()
        .map(|&(tool, package, purpose)| check_tool_exists(tool, package, purpose, false));
    required.chain(later).collect()
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}
