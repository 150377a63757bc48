//! # Program Lifecycle
//!
//! [`ProgramInstance`] takes one package through its states:
//!
//! ```text
//! Created ──run()──▶ Running ──wait_and_export()*──▶ Running
//!    │                  │
//!    └──────────────────┴──stop_and_clean()──▶ Stopped (terminal)
//! ```
//!
//! Two locks are involved. The exit signal ([`CancellationToken`]) is the only
//! state touched by both the export thread and a stopping thread. The phase
//! (and with it every kernel handle) sits behind a mutex that `run` and
//! `wait_and_export` hold while they work; `stop_and_clean` raises the exit
//! signal first and then takes that mutex, so it returns only after the export
//! loop has noticed and let go.
//!
//! `stop_and_clean` must not be called from inside a sink callback (the
//! export loop holds the phase lock); use [`StopHandle::request_stop`] there.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use super::aya_backend::AyaBackend;
use super::backend::{Backend, KernelObject};
use super::cancel::CancellationToken;
use super::resources::KernelResources;
use crate::domain::{ConfigError, ExportSummary, LifecycleError};
use crate::export::{ExportSchema, ExportSink};
use crate::package::ProgramPackage;

enum Phase<O: KernelObject> {
    Created,
    Running(KernelResources<O>),
    Stopped,
}

struct Shared<O: KernelObject> {
    exit: CancellationToken,
    phase: Mutex<Phase<O>>,
}

impl<O: KernelObject> Shared<O> {
    fn lock_phase(&self) -> MutexGuard<'_, Phase<O>> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_and_clean(&self, name: &str) {
        self.exit.cancel();
        let mut phase = self.lock_phase();
        if let Phase::Running(resources) = std::mem::replace(&mut *phase, Phase::Stopped) {
            info!("Stopping {name}");
            drop(resources);
        }
    }
}

/// One loaded package and its kernel state
pub struct ProgramInstance<B: Backend = AyaBackend> {
    package: ProgramPackage,
    backend: B,
    shared: Arc<Shared<B::Object>>,
}

impl ProgramInstance<AyaBackend> {
    /// Parse a package and prepare it for the aya backend
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the package is malformed
    pub fn new(json: &str) -> Result<Self, ConfigError> {
        Self::with_backend(json, AyaBackend)
    }
}

impl<B: Backend> ProgramInstance<B> {
    /// Parse a package and prepare it for a specific backend
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the package is malformed
    pub fn with_backend(json: &str, backend: B) -> Result<Self, ConfigError> {
        Ok(Self::from_package(ProgramPackage::from_json(json)?, backend))
    }

    /// Wrap an already parsed package; nothing touches the kernel until `run`
    #[must_use]
    pub fn from_package(package: ProgramPackage, backend: B) -> Self {
        let shared =
            Arc::new(Shared { exit: CancellationToken::new(), phase: Mutex::new(Phase::Created) });
        Self { package, backend, shared }
    }

    /// The package's declared name
    #[must_use]
    pub fn program_name(&self) -> &str {
        self.package.name()
    }

    /// The parsed package this instance runs
    #[must_use]
    pub fn package(&self) -> &ProgramPackage {
        &self.package
    }

    /// Whether `stop_and_clean` has been requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.exit.is_cancelled()
    }

    /// Open the object, load every program, then attach every program, each
    /// in declaration order.
    ///
    /// On failure everything acquired so far is released and the instance
    /// stays in its previous state.
    ///
    /// # Errors
    /// - [`LifecycleError::Load`] when opening the object or loading a program fails
    /// - [`LifecycleError::Attach`] when attaching a program fails
    /// - [`LifecycleError::AlreadyRunning`] / [`LifecycleError::NotRunning`] when
    ///   called in the wrong state
    pub fn run(&self) -> Result<(), LifecycleError> {
        let mut phase = self.shared.lock_phase();
        match &*phase {
            Phase::Created => {}
            Phase::Running(_) => return Err(LifecycleError::AlreadyRunning),
            Phase::Stopped => return Err(LifecycleError::NotRunning("instance was stopped")),
        }

        let object = self.backend.open(&self.package).map_err(|e| LifecycleError::Load {
            program: self.package.name().to_string(),
            error: format!("{e:#}"),
        })?;
        let mut resources = KernelResources::new(object);

        for program in self.package.programs() {
            resources.load(program)?;
        }
        for program in self.package.programs() {
            resources.attach(program)?;
        }

        *phase = Phase::Running(resources);
        info!(
            "Running {} ({} programs attached)",
            self.package.name(),
            self.package.programs().len()
        );
        Ok(())
    }

    /// Export records until stopped.
    ///
    /// Without an export map this just blocks until [`stop_and_clean`](Self::stop_and_clean).
    /// Otherwise the schema is resolved and the map subscribed on the first
    /// call, and records are polled, decoded and handed to `sink`.
    ///
    /// # Errors
    /// - [`LifecycleError::NotRunning`] before a successful `run` or after stop
    /// - [`LifecycleError::Schema`] when the export declarations are inconsistent
    /// - [`LifecycleError::Poll`] when the buffer cannot be subscribed or polled
    pub fn wait_and_export(&self, mut sink: ExportSink<'_>) -> Result<ExportSummary, LifecycleError> {
        let mut phase = self.shared.lock_phase();
        let resources = match &mut *phase {
            Phase::Running(resources) => resources,
            Phase::Created => return Err(LifecycleError::NotRunning("run() has not succeeded")),
            Phase::Stopped => return Err(LifecycleError::NotRunning("instance was stopped")),
        };

        let Some(map) = self.package.export_map() else {
            info!("{} exports no data, waiting for stop", self.package.name());
            self.shared.exit.wait();
            return Ok(ExportSummary::default());
        };

        let options = self.package.options();
        let channel = resources.export_channel(
            map,
            || {
                ExportSchema::resolve(&map.name, self.package.export_fields(), map.value_size)
                    .map_err(LifecycleError::from)
            },
            options,
        )?;

        sink.begin(&channel.schema, options.print_header)?;
        channel.poller.drive(&channel.schema, &mut sink, &self.shared.exit, options.poll_timeout())
    }

    /// [`wait_and_export`](Self::wait_and_export) with each record rendered as a JSON object
    ///
    /// # Errors
    /// Same as [`wait_and_export`](Self::wait_and_export)
    pub fn wait_and_export_as_json(
        &self,
        receiver: impl FnMut(&str),
    ) -> Result<ExportSummary, LifecycleError> {
        self.wait_and_export(ExportSink::json(receiver))
    }

    /// Signal the export loop, wait for it to return, and release every kernel
    /// handle. Safe to call from any thread, any number of times.
    pub fn stop_and_clean(&self) {
        self.shared.stop_and_clean(self.package.name());
    }

    /// A handle another thread can use to stop this instance
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle<B> {
        StopHandle { name: self.package.name().to_string(), shared: Arc::clone(&self.shared) }
    }
}

impl<B: Backend> Drop for ProgramInstance<B> {
    fn drop(&mut self) {
        self.stop_and_clean();
    }
}

/// Cloneable stop capability for a [`ProgramInstance`]
pub struct StopHandle<B: Backend = AyaBackend> {
    name: String,
    shared: Arc<Shared<B::Object>>,
}

impl<B: Backend> StopHandle<B> {
    /// Same as [`ProgramInstance::stop_and_clean`]
    pub fn stop_and_clean(&self) {
        self.shared.stop_and_clean(&self.name);
    }

    /// Raise the exit signal without waiting for cleanup. Usable from inside a sink.
    pub fn request_stop(&self) {
        if !self.shared.exit.is_cancelled() {
            info!("Stop requested for {}", self.name);
        }
        self.shared.exit.cancel();
    }
}

impl<B: Backend> Clone for StopHandle<B> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), shared: Arc::clone(&self.shared) }
    }
}
