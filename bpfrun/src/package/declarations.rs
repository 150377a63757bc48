//! Declarations carried by a program package: programs and where they attach,
//! maps, export fields and run options.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// A kernel program inside the package object and its hook point
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgramSpec {
    /// Function symbol of the program in the BPF object
    pub name: String,
    pub attach: AttachPoint,
}

/// Kernel hook point a program is attached to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachPoint {
    /// Static tracepoint, e.g. `sched/sched_switch`
    Tracepoint { category: String, name: String },
    RawTracepoint { name: String },
    Kprobe {
        function: String,
        #[serde(default)]
        offset: u64,
    },
    Kretprobe { function: String },
    Uprobe {
        target: PathBuf,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        offset: u64,
        #[serde(default)]
        pid: Option<i32>,
    },
    Uretprobe {
        target: PathBuf,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        offset: u64,
        #[serde(default)]
        pid: Option<i32>,
    },
}

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracepoint { category, name } => write!(f, "tracepoint {category}/{name}"),
            Self::RawTracepoint { name } => write!(f, "raw_tracepoint {name}"),
            Self::Kprobe { function, offset } => write!(f, "kprobe {function}+{offset}"),
            Self::Kretprobe { function } => write!(f, "kretprobe {function}"),
            Self::Uprobe { target, symbol, offset, .. } => {
                write_uprobe(f, "uprobe", target, symbol.as_deref(), *offset)
            }
            Self::Uretprobe { target, symbol, offset, .. } => {
                write_uprobe(f, "uretprobe", target, symbol.as_deref(), *offset)
            }
        }
    }
}

fn write_uprobe(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    target: &std::path::Path,
    symbol: Option<&str>,
    offset: u64,
) -> fmt::Result {
    write!(f, "{kind} {}:{}+{offset}", target.display(), symbol.unwrap_or("<offset>"))
}

/// Kind of a declared BPF map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    RingBuffer,
    PerfEventArray,
    Hash,
    Array,
    PerCpuArray,
    #[serde(other)]
    Other,
}

impl MapKind {
    /// Only ring buffers and perf event arrays stream records to user space
    #[must_use]
    pub fn is_exportable(self) -> bool {
        matches!(self, Self::RingBuffer | Self::PerfEventArray)
    }
}

/// A map declared by the package
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapSpec {
    pub name: String,
    pub kind: MapKind,
    /// Size of one record written by the kernel side, if declared
    #[serde(default)]
    pub value_size: Option<usize>,
}

/// One declared output field, before schema resolution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportFieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_hint: String,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Runtime knobs for polling and printing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Upper bound of one poll; also bounds how long `stop_and_clean` waits
    pub poll_timeout_ms: u64,
    /// Pages per CPU for perf buffers (power of two)
    pub perf_page_count: usize,
    /// Print a column header before the first default-printer line
    pub print_header: bool,
    /// Forward `aya-log` messages from the kernel programs
    pub kernel_log: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { poll_timeout_ms: 100, perf_page_count: 64, print_header: false, kernel_log: false }
    }
}

impl RunOptions {
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }
}
