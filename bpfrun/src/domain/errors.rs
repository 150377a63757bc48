//! Structured error types for bpfrun
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

/// The package JSON could not be turned into a [`ProgramPackage`](crate::package::ProgramPackage).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid package JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Program blob is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Program blob is empty")]
    EmptyObject,

    #[error("Program blob is not a BPF object: {0}")]
    InvalidObject(String),

    #[error("Package declares no programs")]
    NoPrograms,

    #[error("Duplicate program name: {0}")]
    DuplicateProgram(String),

    #[error("Duplicate map name: {0}")]
    DuplicateMap(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Declared export fields are inconsistent with each other or with the record stride.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Export map {0} declares no export fields")]
    NoFields(String),

    #[error("Field {field}: unknown type hint {hint:?}")]
    UnknownType { field: String, hint: String },

    #[error("Field {field}: type {hint} is {expected} bytes wide, declared width is {declared}")]
    WidthMismatch { field: String, hint: String, expected: usize, declared: usize },

    #[error("Field {field}: type {hint} needs a non-zero width")]
    MissingWidth { field: String, hint: String },

    #[error("Duplicate export field: {0}")]
    DuplicateField(String),

    #[error("Field {field} at offset {offset} overlaps the previous field ending at {previous_end}")]
    Overlap { field: String, offset: usize, previous_end: usize },

    #[error("Field {field} ends beyond any addressable record size")]
    TooWide { field: String },

    #[error("Export fields span {width} bytes but the record stride is {stride}")]
    ExceedsStride { width: usize, stride: usize },
}

/// A single raw record could not be decoded.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Record truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Errors surfaced by [`ProgramInstance`](crate::runtime::ProgramInstance) operations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load {program}: {error}")]
    Load { program: String, error: String },

    #[error("Failed to attach {program} to {target}: {error}")]
    Attach { program: String, target: String, error: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Polling {map} failed: {error}")]
    Poll { map: String, error: String },

    #[error("Program is not running: {0}")]
    NotRunning(&'static str),

    #[error("Program is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
