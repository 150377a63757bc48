//! Command-line interface: argument parsing and package loading

mod args;

pub use args::Args;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use crate::package::ProgramPackage;

/// Read and parse a package from a file, or from stdin when `path` is `-`
///
/// # Errors
/// Returns an error if the input cannot be read or is not a valid package
pub fn read_package(path: &Path) -> Result<ProgramPackage> {
    let json = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("Failed to read package from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read package {}", path.display()))?
    };

    ProgramPackage::from_json(&json)
        .with_context(|| format!("Invalid package {}", path.display()))
}
