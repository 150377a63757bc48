//! Kernel backend seam
//!
//! The lifecycle manager only talks to the kernel through these traits.
//! [`AyaBackend`](super::AyaBackend) is the production implementation; tests
//! plug in a double that records every acquire and release.
//!
//! Release is structural: dropping a [`KernelObject`] closes it, dropping a
//! [`RecordSource`] closes the subscription, and [`KernelObject::detach`] /
//! [`KernelObject::unload_program`] release links and programs.

use std::time::Duration;

use anyhow::Result;

use crate::package::{MapSpec, ProgramPackage, ProgramSpec, RunOptions};

/// Outcome of one bounded poll
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<'a> {
    /// One raw record, valid until the next poll
    Record(&'a [u8]),
    /// The kernel dropped this many samples (perf buffer overrun)
    Lost(u64),
    /// Nothing arrived within the timeout
    Empty,
}

/// A subscription to a ring buffer or perf buffer map
pub trait RecordSource: Send {
    /// Wait at most `timeout` for the next record.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be polled any more
    fn poll(&mut self, timeout: Duration) -> Result<Polled<'_>>;
}

/// An opened kernel object (the package skeleton)
pub trait KernelObject: Send {
    /// An attachment; detached by [`KernelObject::detach`]
    type Link: Send;

    /// Load one declared program into the kernel
    ///
    /// # Errors
    /// Returns an error if the program is missing or the verifier rejects it
    fn load_program(&mut self, program: &ProgramSpec) -> Result<()>;

    /// Attach a loaded program to its hook point
    ///
    /// # Errors
    /// Returns an error if the hook point cannot be attached
    fn attach_program(&mut self, program: &ProgramSpec) -> Result<Self::Link>;

    fn detach(&mut self, link: Self::Link);

    fn unload_program(&mut self, program: &ProgramSpec);

    /// Open a record subscription on an export map
    ///
    /// # Errors
    /// Returns an error if the map is missing or is not a ring/perf buffer
    fn subscribe(&mut self, map: &MapSpec, options: &RunOptions) -> Result<Box<dyn RecordSource>>;
}

/// Creates kernel objects from packages
pub trait Backend: Send + Sync {
    type Object: KernelObject;

    /// Create and open the kernel object for a package
    ///
    /// # Errors
    /// Returns an error if the kernel refuses the object
    fn open(&self, package: &ProgramPackage) -> Result<Self::Object>;
}
