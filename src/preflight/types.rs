//! Preflight check types and report.

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - provisioning will fail.
    Fail,
    /// Check passed but with a warning.
    Warn,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: details.map(str::to_string),
        }
    }

    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details))
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details))
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details))
    }
}

/// Results of all preflight checks.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// Returns true if no check failed. Warnings do not count.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    /// Names of the failed checks, in report order.
    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, label) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
                CheckStatus::Warn => ("⚠", "WARN"),
            };

            print!("  {} [{}] {}", icon, label, check.name);
            match &check.details {
                Some(details) => println!(": {}", details),
                None => println!(),
            }
        }

        println!();
        let failed = self.fail_count();
        let warned = self.warn_count();
        println!(
            "Summary: {}/{} passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        if failed > 0 {
            println!("         {} FAILED - provisioning will not succeed", failed);
        }
        if warned > 0 {
            println!("         {} warnings", warned);
        }
    }
}
