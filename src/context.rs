//! Provisioning context shared by every step.
//!
//! Built once before the step graph runs and handed to steps behind an
//! `Arc`. Nothing mutates it afterwards.

use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{self, CommandSpec};

/// Maximum login name length accepted by shadow-utils.
const MAX_USER_NAME_LEN: usize = 32;

/// The user being provisioned.
#[derive(Debug, Clone)]
pub struct UserSpec {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    /// Home directory as seen by the host (under the configured root).
    pub home: PathBuf,
    pub shell: String,
    /// Supplementary groups.
    pub groups: Vec<String>,
}

/// Resolved package-manager invocations.
#[derive(Debug, Clone)]
pub struct PackageCommands {
    pub pacman: Vec<String>,
    pub aur: Vec<String>,
}

impl Default for PackageCommands {
    fn default() -> Self {
        Self {
            pacman: ["pacman", "-q", "--needed", "--noconfirm"]
                .map(String::from)
                .to_vec(),
            aur: ["paru", "-q", "--skipreview", "--needed", "--noconfirm"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl PackageCommands {
    /// `pacman ... -S <packages>` as root.
    pub fn pacman_install(&self, packages: &[String]) -> CommandSpec {
        Self::install(&self.pacman, packages)
    }

    /// `paru ... -S <packages>` as `user`.
    pub fn aur_install(&self, user: &str, packages: &[String]) -> CommandSpec {
        Self::install(&self.aur, packages).run_as(user)
    }

    /// The AUR helper binary itself.
    pub fn aur_program(&self) -> &str {
        self.aur.first().map(String::as_str).unwrap_or("paru")
    }

    fn install(prefix: &[String], packages: &[String]) -> CommandSpec {
        CommandSpec::from_argv(prefix)
            .unwrap_or_else(|| CommandSpec::new("true"))
            .arg("-S")
            .args(packages)
    }
}

/// Every system path a step touches, rooted at the configured prefix.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    pub root: PathBuf,
    pub etc: PathBuf,
    pub pacman_conf: PathBuf,
    pub mirrorlist: PathBuf,
    pub pacman_hooks: PathBuf,
    pub pacman_cache: PathBuf,
    pub makepkg_conf: PathBuf,
    pub sudoers_dir: PathBuf,
    pub tini: PathBuf,
    pub home_base: PathBuf,
    pub root_home: PathBuf,
    pub tmp: PathBuf,
}

impl SystemPaths {
    /// Lay out the standard Arch paths under `root`.
    pub fn under(root: &Path) -> Self {
        let at = |p: &str| rooted(root, Path::new(p));
        Self {
            root: root.to_path_buf(),
            etc: at("/etc"),
            pacman_conf: at("/etc/pacman.conf"),
            mirrorlist: at("/etc/pacman.d/mirrorlist"),
            pacman_hooks: at("/etc/pacman.d/hooks"),
            pacman_cache: at("/var/cache/pacman"),
            makepkg_conf: at("/etc/makepkg.conf"),
            sudoers_dir: at("/etc/sudoers.d"),
            tini: at("/usr/local/bin/tini"),
            home_base: at("/home"),
            root_home: at("/root"),
            tmp: at("/tmp"),
        }
    }
}

/// Join an absolute path onto `root`, ignoring the leading `/`.
pub fn rooted(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Read-only parameters for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    pub user: UserSpec,
    /// Machine hardware name as reported by `uname -m`.
    pub arch: String,
    pub commands: PackageCommands,
    pub paths: SystemPaths,
    pub config: Config,
}

impl ProvisioningContext {
    /// Create a context for `user_name` on a machine of type `arch`.
    ///
    /// # Errors
    /// [`Error::InvalidUserName`] when the name is not a portable login name.
    pub fn new(user_name: &str, arch: &str, config: &Config) -> Result<Self> {
        validate_user_name(user_name)?;
        let paths = SystemPaths::under(Path::new("/"));
        Ok(Self {
            user: UserSpec {
                name: user_name.to_string(),
                uid: config.user_uid,
                gid: config.user_gid,
                home: paths.home_base.join(user_name),
                shell: config.user_shell.clone(),
                groups: vec!["wheel".to_string(), "users".to_string()],
            },
            arch: arch.trim().to_string(),
            commands: PackageCommands::default(),
            paths,
            config: config.clone(),
        })
    }

    /// Relocate every system path under `root`.
    ///
    /// Only file edits follow the new root; commands still act on the
    /// running system. Used to stage or test file steps outside `/`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.paths = SystemPaths::under(root);
        self.user.home = self.paths.home_base.join(&self.user.name);
        self
    }
}

/// Detect the machine hardware name with `uname -m`.
pub async fn detect_arch() -> Result<String> {
    let result = process::execute(&CommandSpec::new("uname").arg("-m").capture()).await?;
    Ok(result.stdout_trimmed().to_string())
}

/// Check `name` is a portable login name: `[a-z_][a-z0-9_-]*` plus an
/// optional trailing `$`, at most 32 bytes.
pub fn validate_user_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(Error::InvalidUserName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.len() > MAX_USER_NAME_LEN {
        return invalid("must be at most 32 characters");
    }
    let body = name.strip_suffix('$').unwrap_or(name);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return invalid("must start with a lowercase letter or underscore"),
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return invalid("may only contain lowercase letters, digits, '_' and '-'");
    }
    Ok(())
}
