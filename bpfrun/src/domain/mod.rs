//! Domain model for bpfrun
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{CpuId, ExportSummary};

pub use errors::{ConfigError, DecodeError, LifecycleError, SchemaError};
