//! Pre-flight checks for livestacks
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};

use crate::domain::Pid;
use crate::process_lookup::process_exists;

/// Minimum kernel version (BPF ring buffer)
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first failed check
pub fn run_preflight_checks(pids: &[Pid]) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    for &pid in pids {
        check_proc_access(pid)?;
    }
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // CAP_BPF + CAP_PERFMON would also do, but checking them needs more
    // than libc offers; require root.
    bail!(
        "Permission denied: livestacks requires root privileges to load eBPF programs.\n\n\
         Run with: sudo livestacks ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version.split_whitespace().nth(2).unwrap_or("unknown");
    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             livestacks requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// `(major, minor)` from a release string like "5.15.0-generic"
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    Some((major, minor.parse().ok()?))
}

/// Check that a target process exists and its memory maps are readable
///
/// # Errors
/// Returns an error if the process is gone or `/proc/<pid>/maps` is unreadable
pub fn check_proc_access(pid: Pid) -> Result<()> {
    if !process_exists(pid) {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }

    let maps_path = format!("/proc/{}/maps", pid.0);
    std::fs::read_to_string(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - Permission denied (run with sudo)\n\
             - /proc is not mounted"
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_check() {
        // Just ensure it doesn't panic; CI kernels vary
        let _ = check_kernel_version();
    }

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(parse_kernel_release("5.15.0-generic"), Some((5, 15)));
        assert_eq!(parse_kernel_release("6.1.0-arch1-1"), Some((6, 1)));
        assert_eq!(parse_kernel_release("6.8-rc1"), Some((6, 8)));
        assert_eq!(parse_kernel_release("unknown"), None);
    }

    #[test]
    fn test_process_not_found() {
        let err = check_proc_access(Pid(999_999_999)).unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_own_process_accessible() {
        assert!(check_proc_access(Pid(std::process::id())).is_ok());
    }
}
