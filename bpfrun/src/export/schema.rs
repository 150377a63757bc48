//! # Export Schema Resolution
//!
//! Turns the package's declared export fields into a fixed record layout.
//! Resolution happens once per program instance; afterwards decoding a record
//! is a plain offset/width lookup per field.
//!
//! ## Type hints
//!
//! | Hint examples                                  | Field type           |
//! |------------------------------------------------|----------------------|
//! | `u32`, `uint32`, `uint32_t`, `__u32`, `unsigned int` | [`FieldType::U32`] |
//! | `i64`, `s64`, `long`, `long long`              | [`FieldType::I64`]   |
//! | `f32`/`float`, `f64`/`double`                  | floats               |
//! | `char[16]`, `string`, `str`                    | [`FieldType::Str`]   |
//! | `bytes`, `u8[6]`, `unsigned char[6]`, `u32[4]` | [`FieldType::Bytes`] |
//!
//! `long` is 8 bytes: BPF programs always run on a 64-bit target.

use std::collections::HashSet;
use std::fmt;

use crate::domain::SchemaError;
use crate::package::ExportFieldSpec;

/// Semantic type of one export field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Fixed-size buffer, passed through verbatim
    Bytes,
    /// Fixed-size, NUL-terminated text
    Str,
}

impl FieldType {
    /// Width in bytes for scalar types; `None` for buffers and strings
    #[must_use]
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Bytes | Self::Str => None,
        }
    }

    /// Parse a type hint. Returns the type and, for array hints like
    /// `char[16]`, the width the hint implies.
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<(Self, Option<usize>)> {
        let normalized = hint.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

        if let Some((base, rest)) = normalized.split_once('[') {
            let count: usize = rest.strip_suffix(']')?.trim().parse().ok()?;
            let base = base.trim();
            return match Self::scalar(base)? {
                Self::I8 if matches!(base, "char" | "signed char") => Some((Self::Str, Some(count))),
                element => Some((Self::Bytes, Some(count.checked_mul(element.fixed_width()?)?))),
            };
        }

        match normalized.as_str() {
            "string" | "str" => Some((Self::Str, None)),
            "bytes" | "buffer" => Some((Self::Bytes, None)),
            scalar => Self::scalar(scalar).map(|ty| (ty, None)),
        }
    }

    fn scalar(name: &str) -> Option<Self> {
        let ty = match name {
            "u8" | "uint8" | "uint8_t" | "__u8" | "unsigned char" | "bool" | "_bool" => Self::U8,
            "u16" | "uint16" | "uint16_t" | "__u16" | "unsigned short" | "unsigned short int" => {
                Self::U16
            }
            "u32" | "uint32" | "uint32_t" | "__u32" | "unsigned int" | "unsigned" => Self::U32,
            "u64" | "uint64" | "uint64_t" | "__u64" | "unsigned long" | "unsigned long int"
            | "unsigned long long" | "unsigned long long int" | "size_t" => Self::U64,
            "i8" | "int8" | "int8_t" | "__s8" | "s8" | "char" | "signed char" => Self::I8,
            "i16" | "int16" | "int16_t" | "__s16" | "s16" | "short" | "short int" => Self::I16,
            "i32" | "int32" | "int32_t" | "__s32" | "s32" | "int" | "signed int" | "signed" => {
                Self::I32
            }
            "i64" | "int64" | "int64_t" | "__s64" | "s64" | "long" | "long int" | "long long"
            | "long long int" | "ssize_t" => Self::I64,
            "f32" | "float" => Self::F32,
            "f64" | "double" => Self::F64,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bytes => "bytes",
            Self::Str => "string",
        };
        f.write_str(name)
    }
}

/// One resolved field: where it lives in the record and how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportField {
    pub name: String,
    pub ty: FieldType,
    pub offset: usize,
    pub width: usize,
}

impl ExportField {
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Resolved, immutable layout of the records exported by one map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSchema {
    fields: Vec<ExportField>,
    record_size: usize,
}

impl ExportSchema {
    /// Resolve declared fields against the map's record stride.
    ///
    /// Without a declared stride the record ends where the last field ends.
    ///
    /// # Errors
    /// Returns [`SchemaError`] for unknown hints, widths that disagree with
    /// their hint, duplicate names, overlapping offsets, or a layout wider
    /// than the stride
    pub fn resolve(
        map: &str,
        specs: &[ExportFieldSpec],
        stride: Option<usize>,
    ) -> Result<Self, SchemaError> {
        if specs.is_empty() {
            return Err(SchemaError::NoFields(map.to_string()));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(specs.len());
        let mut cursor = 0usize;

        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaError::DuplicateField(spec.name.clone()));
            }

            let (ty, implied) = FieldType::from_hint(&spec.type_hint).ok_or_else(|| {
                if is_oversized_array(&spec.type_hint) {
                    SchemaError::TooWide { field: spec.name.clone() }
                } else {
                    SchemaError::UnknownType {
                        field: spec.name.clone(),
                        hint: spec.type_hint.clone(),
                    }
                }
            })?;
            let width = resolve_width(spec, ty, implied)?;

            let offset = match spec.offset {
                Some(offset) if offset < cursor => {
                    return Err(SchemaError::Overlap {
                        field: spec.name.clone(),
                        offset,
                        previous_end: cursor,
                    });
                }
                Some(offset) => offset,
                None => cursor,
            };
            cursor = offset
                .checked_add(width)
                .ok_or_else(|| SchemaError::TooWide { field: spec.name.clone() })?;

            fields.push(ExportField { name: spec.name.clone(), ty, offset, width });
        }

        let record_size = stride.unwrap_or(cursor);
        if cursor > record_size {
            return Err(SchemaError::ExceedsStride { width: cursor, stride: record_size });
        }

        Ok(Self { fields, record_size })
    }

    #[must_use]
    pub fn fields(&self) -> &[ExportField] {
        &self.fields
    }

    /// Minimum length of a raw record
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record_size
    }
}

/// A well-formed array hint whose byte size does not fit in `usize`
fn is_oversized_array(hint: &str) -> bool {
    let Some((base, rest)) = hint.split_once('[') else {
        return false;
    };
    let count_ok = rest.trim().strip_suffix(']').is_some_and(|c| c.trim().parse::<usize>().is_ok());
    count_ok && matches!(FieldType::from_hint(base), Some((_, None)))
}

fn resolve_width(
    spec: &ExportFieldSpec,
    ty: FieldType,
    implied: Option<usize>,
) -> Result<usize, SchemaError> {
    let mismatch = |expected: usize, declared: usize| SchemaError::WidthMismatch {
        field: spec.name.clone(),
        hint: spec.type_hint.clone(),
        expected,
        declared,
    };

    if let Some(fixed) = ty.fixed_width() {
        return match spec.width {
            Some(declared) if declared != fixed => Err(mismatch(fixed, declared)),
            _ => Ok(fixed),
        };
    }

    match (spec.width, implied) {
        (Some(declared), Some(implied)) if declared != implied => Err(mismatch(implied, declared)),
        (Some(width), _) | (None, Some(width)) if width > 0 => Ok(width),
        _ => Err(SchemaError::MissingWidth { field: spec.name.clone(), hint: spec.type_hint.clone() }),
    }
}
