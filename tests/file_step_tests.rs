//! File-editing provisioning steps against a temporary root.

mod helpers;

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use helpers::{assert_file_contains, assert_file_exists, default_config, TestEnv, PACMAN_CONF};
use setup_image::config::Config;
use setup_image::context::ProvisioningContext;
use setup_image::steps::{self, makepkg, pacman, tini, user_setup, users};
use setup_image::task::TaskGraph;
use setup_image::Error;

fn downcast(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("not a typed error: {err:#}"))
}

#[tokio::test]
async fn test_pacman_conf_patched_and_idempotent() {
    let env = TestEnv::new();
    let conf = env.path("/etc/pacman.conf");

    pacman::write_pacman_conf(env.context()).await.unwrap();
    let once = fs::read_to_string(&conf).unwrap();
    pacman::write_pacman_conf(env.context()).await.unwrap();
    let twice = fs::read_to_string(&conf).unwrap();

    assert_ne!(once, PACMAN_CONF);
    assert_eq!(once, twice);
    assert_file_contains(&conf, "\nColor\n");
    assert_file_contains(&conf, "\nParallelDownloads = 9\n");
    assert_file_contains(&conf, "\nCacheDir = /tmp/cache-pacman/pkg\n");
    assert_file_contains(&conf, "Include = /etc/pacman.d/mirrorlist\n");
}

#[tokio::test]
async fn test_missing_pacman_conf_is_file_not_found() {
    let env = TestEnv::new();
    fs::remove_file(env.path("/etc/pacman.conf")).unwrap();

    let err = pacman::write_pacman_conf(env.context()).await.unwrap_err();

    assert!(matches!(downcast(&err), Error::FileNotFound { .. }));
    assert!(!env.path("/etc/pacman.conf").exists());
}

#[tokio::test]
async fn test_makepkg_flags() {
    let env = TestEnv::new();

    makepkg::adjust_makeconf(env.context()).await.unwrap();

    let conf = env.path("/etc/makepkg.conf");
    assert_file_contains(&conf, "\nMAKEFLAGS=\"-j16\"\n");
    assert_file_contains(&conf, "#-- Make Flags");
    assert!(!fs::read_to_string(&conf).unwrap().contains("#MAKEFLAGS"));
}

#[tokio::test]
async fn test_cache_hook_keeps_existing_file() {
    let env = TestEnv::new();
    let hook = env.path("/etc/pacman.d/hooks").join(pacman::CACHE_HOOK_NAME);

    pacman::write_cache_hook(env.context()).await.unwrap();
    assert_file_contains(&hook, "Exec = /usr/bin/paccache -rvk0");

    fs::write(&hook, "# local override\n").unwrap();
    pacman::write_cache_hook(env.context()).await.unwrap();
    assert_eq!(fs::read_to_string(&hook).unwrap(), "# local override\n");
}

#[tokio::test]
async fn test_sudoers_drop_in() {
    let env = TestEnv::new();

    users::write_sudoers(env.context()).await.unwrap();

    let path = env.path("/etc/sudoers.d/10-wheel");
    assert_eq!(fs::read_to_string(&path).unwrap(), "%wheel ALL=(ALL) NOPASSWD: ALL\n");
    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o440);
}

#[tokio::test]
async fn test_cleanup_empties_caches() {
    let env = TestEnv::new();
    let pkg = env.path("/var/cache/pacman/pkg/bat-0.24.0-1-x86_64.pkg.tar.zst");
    let build = env.path("/tmp/cache-pacman/pkg/git-2.44.0-1-x86_64.pkg.tar.zst");
    for file in [&pkg, &build] {
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, b"pkg").unwrap();
    }

    pacman::cleanup(env.context()).await.unwrap();

    assert!(env.path("/var/cache/pacman").is_dir());
    assert_eq!(fs::read_dir(env.path("/var/cache/pacman")).unwrap().count(), 0);
    assert!(!build.exists());
}

#[tokio::test]
async fn test_unsupported_architecture() {
    let env = TestEnv::new();
    let ctx = ProvisioningContext::new("alice", "riscv64", &default_config())
        .unwrap()
        .rooted_at(&env.root);

    let err = tini::install_tini(Arc::new(ctx)).await.unwrap_err();

    assert!(matches!(downcast(&err), Error::UnsupportedArchitecture { arch } if arch == "riscv64"));
    assert!(!env.path("/usr/local/bin/tini").exists());
}

#[tokio::test]
async fn test_post_user_setup_requires_dotfiles() {
    let env = TestEnv::new();
    let vars = HashMap::from([(
        "SETUP_ASSETS_DIR".to_string(),
        env.root.join("assets").display().to_string(),
    )]);
    let config = Config::from_vars(&vars).unwrap();
    let ctx = ProvisioningContext::new("alice", "x86_64", &config)
        .unwrap()
        .rooted_at(&env.root);

    let err = user_setup::post_user_setup(Arc::new(ctx)).await.unwrap_err();
    assert!(err.to_string().contains("user-home"));
}

#[tokio::test]
async fn test_config_steps_as_a_graph() {
    let env = TestEnv::new();
    let ctx = env.context();
    let mut graph = TaskGraph::new();
    {
        let c = Arc::clone(&ctx);
        graph.step(steps::WRITE_PACMAN_CONF, &[], move || pacman::write_pacman_conf(c));
    }
    {
        let c = Arc::clone(&ctx);
        graph.step(steps::WRITE_MIRRORLIST, &[], move || pacman::write_mirrorlist(c));
    }
    {
        let c = Arc::clone(&ctx);
        graph.step(steps::ADJUST_MAKECONF, &[], move || makepkg::adjust_makeconf(c));
    }
    {
        let c = Arc::clone(&ctx);
        graph.step(steps::PACMAN_CACHE_HOOK, &[], move || pacman::write_cache_hook(c));
    }
    {
        let c = Arc::clone(&ctx);
        graph.step(
            steps::CLEANUP,
            &[
                steps::WRITE_PACMAN_CONF,
                steps::WRITE_MIRRORLIST,
                steps::ADJUST_MAKECONF,
                steps::PACMAN_CACHE_HOOK,
            ],
            move || pacman::cleanup(c),
        );
    }

    let report = graph.run().await.unwrap();

    assert_eq!(report.completion_order().last(), Some(&steps::CLEANUP));
    assert_file_exists(&env.path("/etc/pacman.d/mirrorlist"));
    assert_file_contains(
        &env.path("/etc/pacman.d/mirrorlist"),
        "Server = https://mirror.one.com/archlinux/$repo/os/$arch\n",
    );
    assert_file_exists(&env.path("/etc/pacman.d/hooks/0200-pacman-cache-cleanup.hook"));
}
