//! CPU utility functions
//!
//! Utilities for querying CPU information from /sys filesystem.

use anyhow::{Context, Result};
use std::fs;

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// The sampler needs one perf event per CPU, so offline CPUs in the middle
/// of the range (hotplug) must be skipped.
///
/// # Errors
/// Returns an error if the file can't be read or parsed
pub fn online_cpus() -> Result<Vec<u32>> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)
        .with_context(|| format!("Failed to read {ONLINE_CPUS_PATH}"))?;
    parse_cpu_list(&content)
}

/// Parse a kernel cpu list like "0-3" or "0-3,8-11,13"
///
/// # Errors
/// Returns an error on malformed ranges
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("Bad cpu range: {range}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad cpu range: {range}"))?;
            cpus.extend(start..=end);
        } else {
            cpus.push(range.parse().with_context(|| format!("Bad cpu id: {range}"))?);
        }
    }

    Ok(cpus)
}
