//! Program runtime: lifecycle, kernel backend and polling
//!
//! - `instance`: [`ProgramInstance`] state machine (run / export / stop)
//! - `resources`: scoped ownership and reverse-order release of kernel handles
//! - `backend`: traits every kernel backend implements
//! - `aya_backend` / `sources`: the aya implementation (ring buffer, perf buffer)
//! - `poller`: the export loop
//! - `cancel`: exit signal shared with `stop_and_clean`

pub mod aya_backend;
pub mod backend;
pub mod cancel;
pub mod cpu_utils;
pub mod instance;
pub mod poller;
mod resources;
pub mod sources;

pub use aya_backend::{AyaBackend, AyaLink, AyaObject};
pub use backend::{Backend, KernelObject, Polled, RecordSource};
pub use cancel::CancellationToken;
pub use cpu_utils::online_cpus;
pub use instance::{ProgramInstance, StopHandle};
pub use poller::BufferPoller;
