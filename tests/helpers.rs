//! Shared test utilities for setup-image tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use setup_image::config::Config;
use setup_image::context::ProvisioningContext;
use tempfile::TempDir;

/// A stock Arch `pacman.conf` excerpt.
pub const PACMAN_CONF: &str = "\
[options]
HoldPkg     = pacman glibc
#CacheDir    = /var/cache/pacman/pkg/
Architecture = auto

#UseSyslog
#Color
#NoProgressBar
CheckSpace
#VerbosePkgLists
#ParallelDownloads = 5

[core]
Include = /etc/pacman.d/mirrorlist
";

/// A stock `makepkg.conf` excerpt.
pub const MAKEPKG_CONF: &str = "\
CFLAGS=\"-march=x86-64 -mtune=generic -O2 -pipe\"
#-- Make Flags: change this for DistCC/SMP systems
#MAKEFLAGS=\"-j2\"
DEBUG_CFLAGS=\"-g\"
";

/// Test environment with a temporary root holding a mock `/etc`.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Stand-in for `/`
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        fs::create_dir_all(root.join("etc/pacman.d")).expect("Failed to create etc");
        fs::write(root.join("etc/pacman.conf"), PACMAN_CONF).expect("Failed to write pacman.conf");
        fs::write(root.join("etc/makepkg.conf"), MAKEPKG_CONF)
            .expect("Failed to write makepkg.conf");
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// A context for `alice` whose file steps write under this root.
    pub fn context(&self) -> Arc<ProvisioningContext> {
        let ctx = ProvisioningContext::new("alice", "x86_64", &default_config())
            .expect("valid context")
            .rooted_at(&self.root);
        Arc::new(ctx)
    }

    pub fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }
}

/// Configuration with every default applied.
pub fn default_config() -> Config {
    Config::from_vars(&HashMap::new()).expect("defaults are valid")
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} should contain '{}'\nActual content:\n{}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "File should exist: {}", path.display());
}
