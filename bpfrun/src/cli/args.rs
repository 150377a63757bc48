//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::package::RunOptions;

#[derive(Parser)]
#[command(
    name = "bpfrun",
    about = "Load a compiled BPF program package and stream its output",
    after_help = "\
EXAMPLES:
    sudo bpfrun opensnoop.json                   Print records until Ctrl+C
    sudo bpfrun opensnoop.json --json            One JSON object per record
    sudo bpfrun exec.json --duration 10 --header Stop after 10 seconds
    cat pkg.json | sudo bpfrun -                 Read the package from stdin"
)]
pub struct Args {
    /// Program package JSON file ("-" reads stdin)
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Emit one JSON object per record instead of text lines
    #[arg(long)]
    pub json: bool,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Override the package's poll timeout
    #[arg(long, value_name = "MS")]
    pub poll_timeout_ms: Option<u64>,

    /// Print a header line with the field names before the first record
    #[arg(long)]
    pub header: bool,

    /// Forward aya-log output from the kernel programs
    #[arg(long)]
    pub kernel_log: bool,

    /// Skip privilege and kernel version checks
    #[arg(long)]
    pub skip_preflight: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Package options with command-line overrides applied
    #[must_use]
    pub fn apply_to(&self, options: &RunOptions) -> RunOptions {
        let mut options = options.clone();
        if let Some(ms) = self.poll_timeout_ms {
            options.poll_timeout_ms = ms;
        }
        options.print_header |= self.header;
        options.kernel_log |= self.kernel_log;
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_package_options() {
        let args = Args::parse_from(["bpfrun", "pkg.json", "--poll-timeout-ms", "25", "--header"]);
        let options = args.apply_to(&RunOptions::default());

        assert_eq!(options.poll_timeout_ms, 25);
        assert!(options.print_header);
        assert!(!options.kernel_log);
        assert_eq!(options.perf_page_count, RunOptions::default().perf_page_count);
    }

    #[test]
    fn test_package_options_kept_without_flags() {
        let args = Args::parse_from(["bpfrun", "-"]);
        let package_options = RunOptions { poll_timeout_ms: 500, kernel_log: true, ..RunOptions::default() };
        let options = args.apply_to(&package_options);

        assert_eq!(options.poll_timeout_ms, 500);
        assert!(options.kernel_log);
        assert_eq!(args.package, PathBuf::from("-"));
    }
}
