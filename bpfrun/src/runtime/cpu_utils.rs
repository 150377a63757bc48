//! CPU utility functions
//!
//! Perf buffers are opened per CPU; this lists the CPUs to open them on.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file cannot be read or parsed
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content =
        fs::read_to_string(ONLINE_CPUS).with_context(|| format!("Failed to read {ONLINE_CPUS}"))?;
    parse_cpu_list(&content)
}

/// Parse a kernel CPU list such as `0-3` or `0-3,8-11,14`
///
/// # Errors
/// Returns an error on malformed entries or reversed ranges
pub fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for entry in list.trim().split(',').filter(|e| !e.is_empty()) {
        if let Some((start, end)) = entry.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("Bad CPU range {entry:?}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad CPU range {entry:?}"))?;
            anyhow::ensure!(start <= end, "Reversed CPU range {entry:?}");
            cpus.extend((start..=end).map(CpuId));
        } else {
            let cpu: u32 = entry.parse().with_context(|| format!("Bad CPU id {entry:?}"))?;
            cpus.push(CpuId(cpu));
        }
    }

    Ok(cpus)
}
