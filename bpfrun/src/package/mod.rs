//! # Program Packages
//!
//! A package is the JSON description of one compiled eBPF program: its name,
//! the base64-encoded BPF ELF object, which programs to attach where, the
//! maps it declares and the layout of the records it exports.
//!
//! ```json
//! {
//!   "name": "execsnoop",
//!   "data": "f0VMRgIBAQAAAAAAAAAAAAEA9wABAAAA...",
//!   "programs": [{ "name": "handle_exec",
//!                  "attach": { "kind": "tracepoint", "category": "sched", "name": "sched_process_exec" } }],
//!   "maps": [{ "name": "EVENTS", "kind": "ring_buffer", "value_size": 24 }],
//!   "export": [{ "name": "pid", "type": "u32" }, { "name": "comm", "type": "char[16]", "width": 16 }]
//! }
//! ```
//!
//! Parsing decodes the object and checks that it is an ELF file for the BPF
//! machine. Nothing touches the kernel until
//! [`ProgramInstance::run`](crate::runtime::ProgramInstance::run).

pub mod declarations;

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use object::elf::{FileHeader64, EM_BPF};
use object::read::elf::FileHeader;
use object::{Endianness, FileKind};
use serde::Deserialize;

pub use declarations::{AttachPoint, ExportFieldSpec, MapKind, MapSpec, ProgramSpec, RunOptions};

use crate::domain::ConfigError;

#[derive(Deserialize)]
struct RawPackage {
    name: String,
    data: String,
    programs: Vec<ProgramSpec>,
    #[serde(default)]
    maps: Vec<MapSpec>,
    #[serde(default)]
    export: Vec<ExportFieldSpec>,
    #[serde(default)]
    options: RunOptions,
}

/// A validated program package. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct ProgramPackage {
    name: String,
    object: Vec<u8>,
    programs: Vec<ProgramSpec>,
    maps: Vec<MapSpec>,
    export: Vec<ExportFieldSpec>,
    options: RunOptions,
}

impl ProgramPackage {
    /// Parse a package from JSON text
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the JSON is malformed, a required field is
    /// missing, or the embedded object is not a base64-encoded BPF ELF file
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawPackage = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Parse a package from an already-parsed JSON value
    ///
    /// # Errors
    /// Same as [`ProgramPackage::from_json`]
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawPackage = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPackage) -> Result<Self, ConfigError> {
        if raw.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if raw.programs.is_empty() {
            return Err(ConfigError::NoPrograms);
        }
        check_unique(raw.programs.iter().map(|p| p.name.as_str()))
            .map_err(ConfigError::DuplicateProgram)?;
        check_unique(raw.maps.iter().map(|m| m.name.as_str())).map_err(ConfigError::DuplicateMap)?;

        let object = decode_object(&raw.data)?;

        Ok(Self {
            name: raw.name,
            object,
            programs: raw.programs,
            maps: raw.maps,
            export: raw.export,
            options: raw.options,
        })
    }

    /// Replace the run options (used by the CLI to apply flag overrides)
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw BPF ELF object bytes
    #[must_use]
    pub fn object_bytes(&self) -> &[u8] {
        &self.object
    }

    #[must_use]
    pub fn programs(&self) -> &[ProgramSpec] {
        &self.programs
    }

    #[must_use]
    pub fn maps(&self) -> &[MapSpec] {
        &self.maps
    }

    #[must_use]
    pub fn export_fields(&self) -> &[ExportFieldSpec] {
        &self.export
    }

    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// The map records are exported from.
    ///
    /// When several ring buffers or perf arrays are declared, the first one
    /// in declaration order wins.
    #[must_use]
    pub fn export_map(&self) -> Option<&MapSpec> {
        self.maps.iter().find(|m| m.kind.is_exportable())
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), String> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(name.to_string());
        }
    }
    Ok(())
}

/// Base64-decode the object and make sure it is an ELF file built for BPF
fn decode_object(data: &str) -> Result<Vec<u8>, ConfigError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    if bytes.is_empty() {
        return Err(ConfigError::EmptyObject);
    }

    match FileKind::parse(bytes.as_slice()) {
        Ok(FileKind::Elf64) => {}
        Ok(kind) => {
            return Err(ConfigError::InvalidObject(format!("unsupported object kind {kind:?}")))
        }
        Err(e) => return Err(ConfigError::InvalidObject(e.to_string())),
    }

    let header = FileHeader64::<Endianness>::parse(bytes.as_slice())
        .map_err(|e| ConfigError::InvalidObject(e.to_string()))?;
    let endian = header.endian().map_err(|e| ConfigError::InvalidObject(e.to_string()))?;
    let machine = header.e_machine(endian);
    if machine != EM_BPF {
        return Err(ConfigError::InvalidObject(format!(
            "ELF machine {machine} is not BPF ({EM_BPF})"
        )));
    }

    Ok(bytes)
}
