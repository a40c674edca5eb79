//! pacman configuration, initial packages and the final cache cleanup.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::{NoExpand, Regex};

use crate::common::{modify_file, write_file, EditOutcome, Transform};
use crate::context::ProvisioningContext;
use crate::error::Error;
use crate::process;

/// Nordic HTTPS mirrors, fastest first (reflector, sorted by rate).
pub const MIRRORS: &[&str] = &[
    "https://mirror.one.com/archlinux/$repo/os/$arch",
    "https://mirror.osbeck.com/archlinux/$repo/os/$arch",
    "https://mirror.safe-con.dk/archlinux/$repo/os/$arch",
    "https://mirror.neuf.no/archlinux/$repo/os/$arch",
    "https://mirror.wuki.li/archlinux/$repo/os/$arch",
    "https://arch.yhtez.xyz/$repo/os/$arch",
    "https://mirror.archlinux.no/$repo/os/$arch",
    "https://mirror.srv.fail/archlinux/$repo/os/$arch",
    "https://ftp.myrveln.se/pub/linux/archlinux/$repo/os/$arch",
    "https://mirrors.dotsrc.org/archlinux/$repo/os/$arch",
    "https://ftp.acc.umu.se/mirror/archlinux/$repo/os/$arch",
    "https://lysakermoen.com/Software/Linux/Mirrors/ArchLinux/$repo/os/$arch",
];

pub const CACHE_HOOK_NAME: &str = "0200-pacman-cache-cleanup.hook";

const CACHE_HOOK: &str = "\
[Trigger]
Operation = Remove
Operation = Install
Operation = Upgrade
Type = Package
Target = *

[Action]
Description = Removing unnecessary cached files
When = PostTransaction
Exec = /usr/bin/paccache -rvk0
";

/// The `pacman.conf` edits: `Color`, `ParallelDownloads` and `CacheDir`.
///
/// Applying the patch to its own output changes nothing.
#[derive(Debug)]
pub struct PacmanPatch {
    color: Regex,
    parallel: Regex,
    cache_dir: Regex,
    parallel_line: String,
    cache_dir_line: String,
}

impl PacmanPatch {
    pub fn new(parallel_downloads: u32, cache_dir: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            color: Regex::new(r"(?m)^#?Color[ \t]*$")?,
            parallel: Regex::new(r"(?m)^#?ParallelDownloads[ \t]*=[^\r\n]*$")?,
            cache_dir: Regex::new(r"(?m)^#?CacheDir[ \t]*=[^\r\n]*$")?,
            parallel_line: format!("ParallelDownloads = {}", parallel_downloads),
            cache_dir_line: format!("CacheDir = {}", cache_dir),
        })
    }

    pub fn apply(&self, contents: &str) -> String {
        let out = if self.parallel.is_match(contents) {
            let out = self.color.replace(contents, "Color");
            self.parallel
                .replace_all(&out, NoExpand(&self.parallel_line))
                .into_owned()
        } else {
            // Older pacman.conf without the option: add it right after Color.
            let with_parallel = format!("Color\n{}", self.parallel_line);
            self.color
                .replace(contents, NoExpand(&with_parallel))
                .into_owned()
        };
        self.cache_dir
            .replace_all(&out, NoExpand(&self.cache_dir_line))
            .into_owned()
    }
}

pub async fn write_pacman_conf(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let patch = PacmanPatch::new(ctx.config.parallel_downloads, &ctx.config.pacman_cache_dir)
        .context("invalid pacman.conf pattern")?;
    let outcome = modify_file(
        &ctx.paths.pacman_conf,
        &Transform::content(move |contents| patch.apply(contents)),
    )?;
    if outcome == EditOutcome::Unchanged {
        tracing::info!("pacman.conf already configured");
    }
    Ok(())
}

/// `Server = ...` lines for every mirror, newline terminated.
pub fn mirrorlist() -> String {
    MIRRORS
        .iter()
        .map(|mirror| format!("Server = {}\n", mirror))
        .collect()
}

pub async fn write_mirrorlist(ctx: Arc<ProvisioningContext>) -> Result<()> {
    write_file(&ctx.paths.mirrorlist, mirrorlist(), true)?;
    tracing::info!(mirrors = MIRRORS.len(), "mirrorlist written");
    Ok(())
}

/// Install the paccache hook. An existing hook is left alone.
pub async fn write_cache_hook(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let path = ctx.paths.pacman_hooks.join(CACHE_HOOK_NAME);
    match write_file(&path, CACHE_HOOK, false) {
        Ok(()) => Ok(()),
        Err(Error::AlreadyExists { path }) => {
            tracing::info!(path = %path.display(), "hook already present, keeping it");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn install_initial_packages(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let packages = &ctx.config.initial_packages;
    if packages.is_empty() {
        tracing::info!("no initial packages configured");
        return Ok(());
    }
    process::execute(&ctx.commands.pacman_install(packages)).await?;
    tracing::info!(count = packages.len(), "initial packages installed");
    Ok(())
}

/// Empty the package caches so they don't end up in the image.
pub async fn cleanup(ctx: Arc<ProvisioningContext>) -> Result<()> {
    let mut removed = clear_dir(&ctx.paths.pacman_cache)?;
    let build_cache = crate::context::rooted(&ctx.paths.root, Path::new(&ctx.config.pacman_cache_dir));
    if build_cache != ctx.paths.pacman_cache {
        removed += clear_dir(&build_cache)?;
    }
    tracing::info!(removed, "package caches emptied");
    Ok(())
}

/// Remove everything inside `dir`, keeping `dir` itself. A missing
/// directory counts as already empty.
pub fn clear_dir(dir: &Path) -> crate::error::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io("failed to read", dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("failed to read", dir, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| Error::io("failed to stat", &path, e))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .map_err(|e| Error::io("failed to remove", &path, e))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODERN: &str = "\
[options]
HoldPkg     = pacman glibc
#CacheDir    = /var/cache/pacman/pkg/
Architecture = auto

# Misc options
#UseSyslog
#Color
#NoProgressBar
CheckSpace
#VerbosePkgLists
#ParallelDownloads = 5
";

    const LEGACY: &str = "\
[options]
#CacheDir    = /var/cache/pacman/pkg/
#Color
CheckSpace
";

    fn patch() -> PacmanPatch {
        PacmanPatch::new(9, "/tmp/cache-pacman/pkg").unwrap()
    }

    #[test]
    fn test_patch_with_parallel_downloads() {
        let out = patch().apply(MODERN);
        assert!(out.contains("\nColor\n"));
        assert!(out.contains("\nParallelDownloads = 9\n"));
        assert!(out.contains("\nCacheDir = /tmp/cache-pacman/pkg\n"));
        assert!(!out.contains("#ParallelDownloads"));
        assert!(out.contains("#UseSyslog"));
    }

    #[test]
    fn test_patch_inserts_parallel_downloads_after_color() {
        let out = patch().apply(LEGACY);
        assert!(out.contains("\nColor\nParallelDownloads = 9\nCheckSpace\n"));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let patch = patch();
        for input in [MODERN, LEGACY] {
            let once = patch.apply(input);
            assert_eq!(patch.apply(&once), once);
        }
    }

    #[test]
    fn test_mirrorlist_lines() {
        let list = mirrorlist();
        assert_eq!(list.lines().count(), MIRRORS.len());
        assert!(list.lines().all(|l| l.starts_with("Server = https://")));
        assert!(list.ends_with("$arch\n"));
    }

    #[test]
    fn test_clear_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg/nested")).unwrap();
        fs::write(dir.path().join("pkg/nested/a.pkg.tar.zst"), b"x").unwrap();
        fs::write(dir.path().join("stray"), b"x").unwrap();

        assert_eq!(clear_dir(dir.path()).unwrap(), 2);
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        assert_eq!(clear_dir(&dir.path().join("missing")).unwrap(), 0);
    }
}
