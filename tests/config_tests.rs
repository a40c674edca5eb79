//! Configuration loaded from the process environment.

use serial_test::serial;
use setup_image::config::{Config, DEFAULT_AUR_PACKAGES};

const VARS: &[&str] = &[
    "SETUP_USER_UID",
    "SETUP_MAKEFLAGS",
    "SETUP_AUR_PACKAGES",
    "SETUP_TINI_VERSION",
    "SETUP_VERIFY_CHECKSUMS",
];

fn clear() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_load_defaults() {
    clear();

    let config = Config::load().unwrap();

    assert_eq!(config.user_uid, 1000);
    assert_eq!(config.makeflags, "-j16");
    assert_eq!(config.aur_packages.len(), DEFAULT_AUR_PACKAGES.len());
    assert_eq!(config.tini_version, None);
    assert!(config.verify_checksums);
}

#[test]
#[serial]
fn test_load_overrides() {
    clear();
    std::env::set_var("SETUP_USER_UID", "1500");
    std::env::set_var("SETUP_MAKEFLAGS", "-j4");
    std::env::set_var("SETUP_AUR_PACKAGES", "bat, fd");
    std::env::set_var("SETUP_TINI_VERSION", "v0.19.0");
    std::env::set_var("SETUP_VERIFY_CHECKSUMS", "false");

    let config = Config::load().unwrap();
    clear();

    assert_eq!(config.user_uid, 1500);
    assert_eq!(config.makeflags, "-j4");
    assert_eq!(config.aur_packages, vec!["bat", "fd"]);
    assert_eq!(config.tini_version.as_deref(), Some("v0.19.0"));
    assert!(!config.verify_checksums);
}

#[test]
#[serial]
fn test_load_rejects_bad_number() {
    clear();
    std::env::set_var("SETUP_USER_UID", "-1");

    let err = Config::load().unwrap_err();
    clear();

    assert!(err.to_string().contains("SETUP_USER_UID"));
}
