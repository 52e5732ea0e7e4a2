//! Preflight checks.
//!
//! Validates host tools and workspace state before a build. Run with
//! `laminate preflight` to check everything is ready.

use crate::config::{Config, FsType};
use crate::oci::OciLayout;
use crate::process;
use crate::storage::{btrfs, record};

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
    /// Check failed - a build will fail.
    Fail,
    /// Check passed but with a warning.
    Warn,
    /// Check skipped (not applicable).
    #[allow(dead_code)]
    Skip,
}

impl CheckResult {
    pub fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: None,
        }
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: Some(details.to_string()),
        }
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details.to_string()),
        }
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details.to_string()),
        }
    }
}

/// Results of all preflight checks.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if all checks passed (no failures).
    pub fn all_passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    /// Count of failed checks.
    pub fn fail_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .count()
    }

    /// Count of warnings.
    pub fn warn_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
            .count()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let icon = match check.status {
                CheckStatus::Pass => "✓",
                CheckStatus::Fail => "✗",
                CheckStatus::Warn => "⚠",
                CheckStatus::Skip => "○",
            };

            let status_str = match check.status {
                CheckStatus::Pass => "PASS",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Warn => "WARN",
                CheckStatus::Skip => "SKIP",
            };

            print!("  {} [{}] {}", icon, status_str, check.name);
            if let Some(details) = &check.details {
                println!(": {}", details);
            } else {
                println!();
            }
        }

        println!();
        let total = self.checks.len();
        let passed = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Pass)
            .count();
        let failed = self.fail_count();
        let warned = self.warn_count();

        println!("Summary: {}/{} passed", passed, total);
        if failed > 0 {
            println!("         {} FAILED - builds will not succeed", failed);
        }
        if warned > 0 {
            println!("         {} warnings", warned);
        }
    }
}

/// Run every check relevant to the configuration.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = check_host_tools(config.fs_type);
    checks.push(check_layout(config));
    if config.fs_type == FsType::Btrfs {
        checks.push(check_volume(config));
    }
    for finding in record::consistency_findings(config) {
        checks.push(CheckResult::fail("checkout state", &finding));
    }
    PreflightReport { checks }
}

/// Check host tools are installed.
fn check_host_tools(fs_type: FsType) -> Vec<CheckResult> {
    let mut results = Vec::new();

    // Required tools with package hints
    let required_tools = [
        ("umoci", "umoci", "Required to unpack and repack images"),
        ("tar", "tar", "Required for expand steps"),
        ("chroot", "coreutils", "Required for run steps"),
    ];

    for (tool, package, purpose) in required_tools {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    // The snapshot driver shells out to considerably more.
    if fs_type == FsType::Btrfs {
        let btrfs_tools = [
            ("btrfs", "btrfs-progs", "Required for subvolume snapshots"),
            ("mkfs.btrfs", "btrfs-progs", "Required to create the backing volume"),
            ("mount", "util-linux", "Required to mount the backing volume"),
            ("umount", "util-linux", "Required to unmount the backing volume"),
            ("mountpoint", "util-linux", "Required to detect the volume state"),
            ("truncate", "coreutils", "Required to create the backing file"),
            ("rsync", "rsync", "Required to materialize layer chains"),
        ];

        for (tool, package, purpose) in btrfs_tools {
            results.push(check_tool_exists(tool, package, purpose, true));
        }
    }

    results
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

fn check_layout(config: &Config) -> CheckResult {
    match OciLayout::new(&config.oci_dir).validate() {
        Ok(()) => CheckResult::pass_with("image layout", &config.oci_dir.display().to_string()),
        Err(e) => CheckResult::warn(
            "image layout",
            &format!("{}. Checkouts need a populated layout.", e),
        ),
    }
}

fn check_volume(config: &Config) -> CheckResult {
    let file_exists = config.lo_file.exists();
    let mounted = btrfs::is_mountpoint(&config.btrfs_mount);
    match (file_exists, mounted) {
        (true, true) => CheckResult::pass_with(
            "btrfs volume",
            &format!("mounted at {}", config.btrfs_mount.display()),
        ),
        (true, false) => CheckResult::pass_with(
            "btrfs volume",
            "backing file present, not mounted (mounted on demand)",
        ),
        (false, false) => {
            CheckResult::pass_with("btrfs volume", "not provisioned (created on demand)")
        }
        (false, true) => CheckResult::warn(
            "btrfs volume",
            &format!(
                "{} is mounted but backing file {} is missing",
                config.btrfs_mount.display(),
                config.lo_file.display()
            ),
        ),
    }
}
