//! Preflight checks for provisioning.
//!
//! Validates host tools and the environment before any step runs.
//! Run with `setup-image preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config, user_name: Option<&str>) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools());

    println!("Checking environment...");
    checks.extend(environment::check_environment(config, user_name));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config, user_name: Option<&str>) -> Result<()> {
    let report = run_preflight(config, user_name);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed ({}). Fix the issues above before provisioning.",
            report.fail_count(),
            report.failures().join(", ")
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
