//! Scoped ownership of everything a running package holds in the kernel
//!
//! [`KernelResources`] is filled step by step by `run()`. Dropping it,
//! whether after a failed step or from `stop_and_clean`, releases in strict
//! reverse order: export subscription, links, programs, then the object.

use log::debug;

use super::backend::KernelObject;
use super::poller::BufferPoller;
use crate::domain::LifecycleError;
use crate::export::ExportSchema;
use crate::package::{MapSpec, ProgramSpec, RunOptions};

/// Resolved schema plus the poller bound to the export map
pub(crate) struct ExportChannel {
    pub(crate) schema: ExportSchema,
    pub(crate) poller: BufferPoller,
}

pub(crate) struct KernelResources<O: KernelObject> {
    object: O,
    programs: Vec<ProgramSpec>,
    links: Vec<(String, O::Link)>,
    export: Option<ExportChannel>,
}

impl<O: KernelObject> KernelResources<O> {
    pub(crate) fn new(object: O) -> Self {
        Self { object, programs: Vec::new(), links: Vec::new(), export: None }
    }

    pub(crate) fn load(&mut self, program: &ProgramSpec) -> Result<(), LifecycleError> {
        self.object.load_program(program).map_err(|e| LifecycleError::Load {
            program: program.name.clone(),
            error: format!("{e:#}"),
        })?;
        self.programs.push(program.clone());
        debug!("Loaded program {}", program.name);
        Ok(())
    }

    pub(crate) fn attach(&mut self, program: &ProgramSpec) -> Result<(), LifecycleError> {
        let link = self.object.attach_program(program).map_err(|e| LifecycleError::Attach {
            program: program.name.clone(),
            target: program.attach.to_string(),
            error: format!("{e:#}"),
        })?;
        self.links.push((program.name.clone(), link));
        debug!("Attached {} to {}", program.name, program.attach);
        Ok(())
    }

    /// The export channel, created on first use and kept for later cycles
    pub(crate) fn export_channel(
        &mut self,
        map: &MapSpec,
        schema: impl FnOnce() -> Result<ExportSchema, LifecycleError>,
        options: &RunOptions,
    ) -> Result<&mut ExportChannel, LifecycleError> {
        let channel = match self.export.take() {
            Some(channel) => channel,
            None => {
                let schema = schema()?;
                let source = self.object.subscribe(map, options).map_err(|e| {
                    LifecycleError::Poll { map: map.name.clone(), error: format!("{e:#}") }
                })?;
                debug!("Subscribed to {} ({:?})", map.name, map.kind);
                ExportChannel { schema, poller: BufferPoller::new(map.name.clone(), source) }
            }
        };
        Ok(self.export.insert(channel))
    }
}

impl<O: KernelObject> Drop for KernelResources<O> {
    fn drop(&mut self) {
        if let Some(channel) = self.export.take() {
            debug!("Closing subscription on {}", channel.poller.map());
            drop(channel);
        }
        while let Some((name, link)) = self.links.pop() {
            self.object.detach(link);
            debug!("Detached {name}");
        }
        while let Some(program) = self.programs.pop() {
            self.object.unload_program(&program);
            debug!("Unloaded {}", program.name);
        }
        // `object` is released when the fields drop, after everything above
    }
}
