//! Newtypes shared across modules

use std::fmt;

/// An online CPU index, as listed in `/sys/devices/system/cpu/online`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU#{}", self.0)
    }
}

/// Summary of one `wait_and_export` cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Records decoded and handed to the sink
    pub delivered: u64,
    /// Records skipped because they failed to decode
    pub decode_failures: u64,
    /// Samples the kernel dropped before user space could read them
    pub lost: u64,
}
