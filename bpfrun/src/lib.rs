//! # bpfrun - user-space runner for compiled eBPF program packages
//!
//! bpfrun takes a *program package* (a JSON document carrying a compiled BPF
//! ELF object plus declarations of its programs, maps and exported record
//! layout), loads and attaches it through aya, and streams the records the
//! kernel side pushes into a ring buffer or perf buffer to a caller-chosen
//! sink until it is told to stop.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Program package (JSON)                      │
//! │    name · base64 BPF ELF · programs · maps · export fields      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ ProgramPackage::from_json
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ProgramInstance (runtime)                      │
//! │                                                                 │
//! │  run()           open object → load programs → attach           │
//! │  wait_and_export poll → decode → sink, until stopped            │
//! │  stop_and_clean  signal → wait for loop → release in reverse    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ Backend / KernelObject / RecordSource
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 aya (kernel programs and maps)                  │
//! │  Tracepoints · raw tracepoints · k(ret)probes · u(ret)probes    │
//! │  RingBuf · PerfEventArray                                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`package`]: package parsing and validation (declarations, run options)
//! - [`export`]: export schema resolution, record decoding and sinks
//! - [`runtime`]: lifecycle state machine, kernel backend seam, buffer polling
//! - [`domain`]: error enums and small shared types
//! - [`preflight`]: privilege and kernel version checks for the CLI
//! - [`cli`]: command-line arguments and package loading
//!
//! ## Typical Usage
//!
//! ```no_run
//! use bpfrun::{ExportSink, ProgramInstance};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let json = std::fs::read_to_string("execsnoop.json")?;
//! let instance = ProgramInstance::new(&json)?;
//! instance.run()?;
//!
//! let stop = instance.stop_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//!     stop.request_stop();
//! });
//!
//! let summary = instance.wait_and_export(ExportSink::stdout())?;
//! eprintln!("{} records", summary.delivered);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod domain;
pub mod export;
pub mod package;
pub mod preflight;
pub mod runtime;

pub use domain::{ConfigError, DecodeError, ExportSummary, LifecycleError, SchemaError};
pub use export::{DecodedRecord, ExportSchema, ExportSink, FieldType, FieldValue};
pub use package::ProgramPackage;
pub use runtime::{AyaBackend, ProgramInstance, StopHandle};
