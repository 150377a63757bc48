//! Pre-flight checks for bpfrun
//!
//! Validates system requirements before asking the kernel to load anything.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::package::{AttachPoint, MapKind, ProgramPackage};

/// `BPF_MAP_TYPE_RINGBUF` appeared in 5.8
const RING_BUFFER_KERNEL: (u32, u32) = (5, 8);
/// Perf buffer output and tracepoint programs
const BASE_KERNEL: (u32, u32) = (4, 4);

/// Run all pre-flight checks for a package
///
/// # Errors
/// Returns an error describing the first unmet requirement
pub fn run_preflight_checks(package: &ProgramPackage) -> Result<()> {
    check_privileges()?;
    check_kernel_version(required_kernel(package))?;
    for program in package.programs() {
        if let AttachPoint::Uprobe { target, .. } | AttachPoint::Uretprobe { target, .. } =
            &program.attach
        {
            check_binary_exists(target)?;
        }
    }
    Ok(())
}

/// Oldest kernel able to run this package
#[must_use]
pub fn required_kernel(package: &ProgramPackage) -> (u32, u32) {
    match package.export_map().map(|m| m.kind) {
        Some(MapKind::RingBuffer) => RING_BUFFER_KERNEL,
        _ => BASE_KERNEL,
    }
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // CAP_BPF/CAP_PERFMON would also do, but checking them needs more than libc
    bail!(
        "Permission denied: bpfrun requires root privileges to load eBPF programs.\n\n\
         Run with: sudo bpfrun ..."
    );
}

/// Parse `major.minor` out of a kernel release such as `6.1.0-arch1-1`
fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the kernel version is sufficient
fn check_kernel_version(required: (u32, u32)) -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 5.15.0-generic ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < required {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             This package requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            required.0,
            required.1,
        );
    }

    Ok(())
}

/// Check that a uprobe target exists and is a file
fn check_binary_exists(target: &Path) -> Result<()> {
    if !target.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the uprobe target path in the package is correct.",
            target.display()
        );
    }
    if !target.is_file() {
        bail!(
            "Not a file: {}\n\n\
             A uprobe target must be an executable or shared library, not a directory.",
            target.display()
        );
    }
    Ok(())
}
