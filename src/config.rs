//! Configuration management for setup-image.
//!
//! Reads configuration from environment variables. `main` loads a `.env`
//! file first through `dotenvy`, so variables set in the real environment
//! take precedence over the file.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::download::GITHUB_API_URL;

/// Packages installed with pacman before the AUR helper exists.
pub const DEFAULT_INITIAL_PACKAGES: &[&str] = &["base-devel", "git"];

/// Packages installed through the AUR helper.
pub const DEFAULT_AUR_PACKAGES: &[&str] = &[
    "pacman-contrib",
    "vim",
    "ripgrep",
    "exa",
    "direnv",
    "mkcert",
    "libfaketime",
    "watchman-bin",
    "bat",
    "fzf",
    "fd",
];

/// setup-image configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// UID of the provisioned user (default: 1000)
    pub user_uid: u32,
    /// GID of the provisioned user's primary group (default: 1000)
    pub user_gid: u32,
    /// Login shell of the provisioned user (default: /usr/bin/fish)
    pub user_shell: String,
    /// Login shell set for root (default: /bin/fish)
    pub root_shell: String,
    /// Value for MAKEFLAGS in makepkg.conf
    pub makeflags: String,
    /// ParallelDownloads in pacman.conf
    pub parallel_downloads: u32,
    /// CacheDir in pacman.conf
    pub pacman_cache_dir: String,
    pub initial_packages: Vec<String>,
    pub aur_packages: Vec<String>,
    /// Pinned tini release tag; `None` resolves the latest release
    pub tini_version: Option<String>,
    /// Verify published checksums of downloaded binaries
    pub verify_checksums: bool,
    /// Directory holding the `user-home/` dotfiles tree
    pub assets_dir: PathBuf,
    /// GitHub REST API endpoint used to resolve release tags
    pub github_api_url: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build configuration from a variable map, applying defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let parse_u32 = |key: &str, default: u32| -> Result<u32> {
            get(key)
                .map(|v| {
                    v.parse::<u32>()
                        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, v))
                })
                .transpose()
                .map(|v| v.unwrap_or(default))
        };

        let list = |key: &str, default: &[&str]| -> Vec<String> {
            match get(key) {
                Some(v) => v
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => default.iter().map(|s| s.to_string()).collect(),
            }
        };

        let verify_checksums = match get("SETUP_VERIFY_CHECKSUMS") {
            None => true,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => anyhow::bail!("SETUP_VERIFY_CHECKSUMS must be a boolean, got '{}'", v),
            },
        };

        let assets_dir = get("SETUP_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_assets_dir);

        Ok(Self {
            user_uid: parse_u32("SETUP_USER_UID", 1000)?,
            user_gid: parse_u32("SETUP_USER_GID", 1000)?,
            user_shell: get("SETUP_USER_SHELL").unwrap_or("/usr/bin/fish").to_string(),
            root_shell: get("SETUP_ROOT_SHELL").unwrap_or("/bin/fish").to_string(),
            makeflags: get("SETUP_MAKEFLAGS").unwrap_or("-j16").to_string(),
            parallel_downloads: parse_u32("SETUP_PARALLEL_DOWNLOADS", 9)?,
            pacman_cache_dir: get("SETUP_PACMAN_CACHE_DIR")
                .unwrap_or("/tmp/cache-pacman/pkg")
                .to_string(),
            initial_packages: list("SETUP_INITIAL_PACKAGES", DEFAULT_INITIAL_PACKAGES),
            aur_packages: list("SETUP_AUR_PACKAGES", DEFAULT_AUR_PACKAGES),
            tini_version: get("SETUP_TINI_VERSION")
                .filter(|v| *v != "latest")
                .map(str::to_string),
            verify_checksums,
            assets_dir,
            github_api_url: get("SETUP_GITHUB_API_URL").unwrap_or(GITHUB_API_URL).to_string(),
        })
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  SETUP_USER_UID: {}", self.user_uid);
        println!("  SETUP_USER_GID: {}", self.user_gid);
        println!("  SETUP_USER_SHELL: {}", self.user_shell);
        println!("  SETUP_ROOT_SHELL: {}", self.root_shell);
        println!("  SETUP_MAKEFLAGS: {}", self.makeflags);
        println!("  SETUP_PARALLEL_DOWNLOADS: {}", self.parallel_downloads);
        println!("  SETUP_PACMAN_CACHE_DIR: {}", self.pacman_cache_dir);
        println!("  SETUP_INITIAL_PACKAGES: {}", self.initial_packages.join(" "));
        println!("  SETUP_AUR_PACKAGES: {}", self.aur_packages.join(" "));
        println!(
            "  SETUP_TINI_VERSION: {}",
            self.tini_version.as_deref().unwrap_or("latest")
        );
        println!("  SETUP_VERIFY_CHECKSUMS: {}", self.verify_checksums);
        println!("  SETUP_ASSETS_DIR: {}", self.assets_dir.display());
        if self.assets_dir.join("user-home").is_dir() {
            println!("  user-home assets: FOUND");
        } else {
            println!("  user-home assets: NOT FOUND");
        }
    }
}

/// Assets ship next to the installed binary.
fn default_assets_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}
