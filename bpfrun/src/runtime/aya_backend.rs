//! # aya Backend
//!
//! Production [`Backend`]: opens the package object with aya, loads and
//! attaches its programs, and subscribes to ring buffer / perf event array
//! maps.
//!
//! ## Attachment Points
//!
//! | Package `kind`                | aya program type | Link kept            |
//! |-------------------------------|------------------|----------------------|
//! | `tracepoint`                  | `TracePoint`     | `TracePointLink`     |
//! | `raw_tracepoint`              | `RawTracePoint`  | `RawTracePointLink`  |
//! | `kprobe` / `kretprobe`        | `KProbe`         | `KProbeLink`         |
//! | `uprobe` / `uretprobe`        | `UProbe`         | `UProbeLink`         |
//!
//! Whether a `KProbe`/`UProbe` is an entry or return probe is decided by the
//! program's section in the object; the package `kind` only picks the type.
//!
//! Links are taken out of the program with `take_link` so that dropping them
//! detaches, independently of the `Ebpf` object.

use anyhow::{bail, Context, Result};
use aya::{
    maps::{PerfEventArray, RingBuf},
    programs::{
        kprobe::KProbeLink, raw_trace_point::RawTracePointLink, trace_point::TracePointLink,
        uprobe::UProbeLink, KProbe, Program, ProgramError, RawTracePoint, TracePoint, UProbe,
    },
    Ebpf, EbpfLoader,
};
use aya_log::EbpfLogger;
use log::{info, warn};

use super::backend::{Backend, KernelObject, RecordSource};
use super::sources::{PerfSource, RingBufSource};
use crate::package::{AttachPoint, MapKind, MapSpec, ProgramPackage, ProgramSpec, RunOptions};

/// Loads packages into the running kernel through aya
#[derive(Debug, Clone, Copy, Default)]
pub struct AyaBackend;

impl Backend for AyaBackend {
    type Object = AyaObject;

    fn open(&self, package: &ProgramPackage) -> Result<AyaObject> {
        let mut ebpf = EbpfLoader::new()
            .load(package.object_bytes())
            .with_context(|| format!("Failed to open BPF object for {}", package.name()))?;
        if package.options().kernel_log {
            init_ebpf_logger(&mut ebpf);
        }
        info!("Opened BPF object for {}", package.name());
        Ok(AyaObject { ebpf })
    }
}

/// Forward `aya-log` records emitted by the kernel programs to the `log` facade
fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// An opened aya `Ebpf` object
pub struct AyaObject {
    ebpf: Ebpf,
}

/// Owned attachment; detaches when dropped
pub enum AyaLink {
    TracePoint(TracePointLink),
    RawTracePoint(RawTracePointLink),
    KProbe(KProbeLink),
    UProbe(UProbeLink),
}

impl AyaObject {
    fn program_mut(&mut self, name: &str) -> Result<&mut Program> {
        self.ebpf.program_mut(name).with_context(|| format!("{name} program not found"))
    }
}

fn load_typed(program: &mut Program, attach: &AttachPoint) -> Result<(), ProgramError> {
    match attach {
        AttachPoint::Tracepoint { .. } => <&mut TracePoint>::try_from(program)?.load(),
        AttachPoint::RawTracepoint { .. } => <&mut RawTracePoint>::try_from(program)?.load(),
        AttachPoint::Kprobe { .. } | AttachPoint::Kretprobe { .. } => {
            <&mut KProbe>::try_from(program)?.load()
        }
        AttachPoint::Uprobe { .. } | AttachPoint::Uretprobe { .. } => {
            <&mut UProbe>::try_from(program)?.load()
        }
    }
}

fn unload_typed(program: &mut Program, attach: &AttachPoint) -> Result<(), ProgramError> {
    match attach {
        AttachPoint::Tracepoint { .. } => <&mut TracePoint>::try_from(program)?.unload(),
        AttachPoint::RawTracepoint { .. } => <&mut RawTracePoint>::try_from(program)?.unload(),
        AttachPoint::Kprobe { .. } | AttachPoint::Kretprobe { .. } => {
            <&mut KProbe>::try_from(program)?.unload()
        }
        AttachPoint::Uprobe { .. } | AttachPoint::Uretprobe { .. } => {
            <&mut UProbe>::try_from(program)?.unload()
        }
    }
}

fn attach_typed(program: &mut Program, attach: &AttachPoint) -> Result<AyaLink, ProgramError> {
    let link = match attach {
        AttachPoint::Tracepoint { category, name } => {
            let program = <&mut TracePoint>::try_from(program)?;
            let id = program.attach(category, name)?;
            AyaLink::TracePoint(program.take_link(id)?)
        }
        AttachPoint::RawTracepoint { name } => {
            let program = <&mut RawTracePoint>::try_from(program)?;
            let id = program.attach(name)?;
            AyaLink::RawTracePoint(program.take_link(id)?)
        }
        AttachPoint::Kprobe { function, offset } => {
            let program = <&mut KProbe>::try_from(program)?;
            let id = program.attach(function, *offset)?;
            AyaLink::KProbe(program.take_link(id)?)
        }
        AttachPoint::Kretprobe { function } => {
            let program = <&mut KProbe>::try_from(program)?;
            let id = program.attach(function, 0)?;
            AyaLink::KProbe(program.take_link(id)?)
        }
        AttachPoint::Uprobe { target, symbol, offset, pid }
        | AttachPoint::Uretprobe { target, symbol, offset, pid } => {
            let program = <&mut UProbe>::try_from(program)?;
            let id = program.attach(symbol.as_deref(), *offset, target, *pid)?;
            AyaLink::UProbe(program.take_link(id)?)
        }
    };
    Ok(link)
}

impl KernelObject for AyaObject {
    type Link = AyaLink;

    fn load_program(&mut self, spec: &ProgramSpec) -> Result<()> {
        let program = self.program_mut(&spec.name)?;
        load_typed(program, &spec.attach).with_context(|| format!("Failed to load {}", spec.name))
    }

    fn attach_program(&mut self, spec: &ProgramSpec) -> Result<AyaLink> {
        let program = self.program_mut(&spec.name)?;
        let link = attach_typed(program, &spec.attach)?;
        info!("✓ Attached {}: {}", spec.name, spec.attach);
        Ok(link)
    }

    fn detach(&mut self, link: AyaLink) {
        drop(link);
    }

    fn unload_program(&mut self, spec: &ProgramSpec) {
        let Some(program) = self.ebpf.program_mut(&spec.name) else {
            return;
        };
        if let Err(e) = unload_typed(program, &spec.attach) {
            warn!("Failed to unload {}: {e}", spec.name);
        }
    }

    fn subscribe(&mut self, map: &MapSpec, options: &RunOptions) -> Result<Box<dyn RecordSource>> {
        let raw = self
            .ebpf
            .take_map(&map.name)
            .with_context(|| format!("{} map not found", map.name))?;

        match map.kind {
            MapKind::RingBuffer => {
                let ring = RingBuf::try_from(raw)
                    .with_context(|| format!("{} is not a ring buffer", map.name))?;
                Ok(Box::new(RingBufSource::new(ring)))
            }
            MapKind::PerfEventArray => {
                let array = PerfEventArray::try_from(raw)
                    .with_context(|| format!("{} is not a perf event array", map.name))?;
                Ok(Box::new(PerfSource::open(array, options.perf_page_count)?))
            }
            kind => bail!("{} map of kind {kind:?} cannot export records", map.name),
        }
    }
}
