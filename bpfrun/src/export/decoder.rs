//! Record decoding
//!
//! Reads each schema field out of a raw record. Integers and floats use
//! native endianness (the kernel wrote them on this machine), strings stop at
//! the first NUL inside their width, byte buffers are borrowed as-is.

use std::borrow::Cow;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::schema::{ExportField, ExportSchema, FieldType};
use crate::domain::DecodeError;

/// A decoded field value. Text and buffers borrow from the raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Str(Cow<'a, str>),
    Bytes(&'a [u8]),
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(bytes) => write_hex(f, bytes),
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

impl Serialize for FieldValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unsigned(v) => serializer.serialize_u64(*v),
            Self::Signed(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Bytes(_) => serializer.collect_str(self),
        }
    }
}

/// One decoded record: field names (from the schema) paired with values, in
/// schema order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord<'s, 'a> {
    fields: Vec<(&'s str, FieldValue<'a>)>,
}

impl<'s, 'a> DecodedRecord<'s, 'a> {
    #[must_use]
    pub fn fields(&self) -> &[(&'s str, FieldValue<'a>)] {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue<'a>> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Render as one JSON object with keys in schema order
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `name=value` pairs separated by spaces
impl fmt::Display for DecodedRecord<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl Serialize for DecodedRecord<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Decode one raw record against a schema.
///
/// # Errors
/// Returns [`DecodeError::Truncated`] when `raw` is shorter than the schema's
/// record size. Longer records (perf buffer padding) are accepted.
pub fn decode<'s, 'a>(
    schema: &'s ExportSchema,
    raw: &'a [u8],
) -> Result<DecodedRecord<'s, 'a>, DecodeError> {
    if raw.len() < schema.record_size() {
        return Err(DecodeError::Truncated { expected: schema.record_size(), actual: raw.len() });
    }

    let fields = schema
        .fields()
        .iter()
        .map(|field| (field.name.as_str(), decode_field(field, &raw[field.offset..field.end()])))
        .collect();

    Ok(DecodedRecord { fields })
}

fn decode_field<'a>(field: &ExportField, bytes: &'a [u8]) -> FieldValue<'a> {
    match field.ty {
        FieldType::U8 => FieldValue::Unsigned(u64::from(bytes[0])),
        FieldType::U16 => FieldValue::Unsigned(u64::from(u16::from_ne_bytes(array(bytes)))),
        FieldType::U32 => FieldValue::Unsigned(u64::from(u32::from_ne_bytes(array(bytes)))),
        FieldType::U64 => FieldValue::Unsigned(u64::from_ne_bytes(array(bytes))),
        FieldType::I8 => FieldValue::Signed(i64::from(i8::from_ne_bytes(array(bytes)))),
        FieldType::I16 => FieldValue::Signed(i64::from(i16::from_ne_bytes(array(bytes)))),
        FieldType::I32 => FieldValue::Signed(i64::from(i32::from_ne_bytes(array(bytes)))),
        FieldType::I64 => FieldValue::Signed(i64::from_ne_bytes(array(bytes))),
        FieldType::F32 => FieldValue::Float(f64::from(f32::from_ne_bytes(array(bytes)))),
        FieldType::F64 => FieldValue::Float(f64::from_ne_bytes(array(bytes))),
        FieldType::Bytes => FieldValue::Bytes(bytes),
        FieldType::Str => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            FieldValue::Str(String::from_utf8_lossy(&bytes[..end]))
        }
    }
}

/// Field widths are fixed by the schema, so the slice always has `N` bytes
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::ExportFieldSpec;
    use proptest::prelude::*;

    fn schema(fields: &[(&str, &str, Option<usize>)], stride: Option<usize>) -> ExportSchema {
        let specs: Vec<_> = fields
            .iter()
            .map(|(name, hint, width)| ExportFieldSpec {
                name: (*name).to_string(),
                type_hint: (*hint).to_string(),
                width: *width,
                offset: None,
            })
            .collect();
        ExportSchema::resolve("EVENTS", &specs, stride).unwrap()
    }

    #[test]
    fn test_decode_pid() {
        let schema = schema(&[("pid", "uint32", Some(4))], Some(4));
        let raw = 1u32.to_ne_bytes();

        let record = decode(&schema, &raw).unwrap();
        assert_eq!(record.get("pid"), Some(&FieldValue::Unsigned(1)));
        assert_eq!(record.to_string(), "pid=1");
        assert_eq!(record.to_json().unwrap(), r#"{"pid":1}"#);
    }

    #[test]
    fn test_sign_extension() {
        let schema = schema(&[("a", "i8", None), ("b", "i16", None), ("c", "s32", None)], None);
        let mut raw = Vec::new();
        raw.extend_from_slice(&(-1i8).to_ne_bytes());
        raw.extend_from_slice(&(-300i16).to_ne_bytes());
        raw.extend_from_slice(&i32::MIN.to_ne_bytes());

        let record = decode(&schema, &raw).unwrap();
        assert_eq!(record.get("a"), Some(&FieldValue::Signed(-1)));
        assert_eq!(record.get("b"), Some(&FieldValue::Signed(-300)));
        assert_eq!(record.get("c"), Some(&FieldValue::Signed(i64::from(i32::MIN))));
    }

    #[test]
    fn test_unsigned_zero_extension() {
        let schema = schema(&[("flags", "u8", None), ("port", "u16", None)], None);
        let mut raw = vec![0xff];
        raw.extend_from_slice(&0xfffeu16.to_ne_bytes());

        let record = decode(&schema, &raw).unwrap();
        assert_eq!(record.get("flags"), Some(&FieldValue::Unsigned(255)));
        assert_eq!(record.get("port"), Some(&FieldValue::Unsigned(0xfffe)));
    }

    #[test]
    fn test_string_stops_at_nul() {
        let schema = schema(&[("comm", "char[8]", None)], None);
        let raw = *b"bash\0xyz";

        let record = decode(&schema, &raw).unwrap();
        assert_eq!(record.get("comm"), Some(&FieldValue::Str(Cow::Borrowed("bash"))));
    }

    #[test]
    fn test_string_without_nul_uses_full_width() {
        let schema = schema(&[("comm", "string", Some(4))], None);
        let record = decode(&schema, b"abcd").unwrap();
        assert_eq!(record.to_string(), "comm=abcd");
    }

    #[test]
    fn test_bytes_render_as_hex() {
        let schema = schema(&[("mac", "u8[3]", None), ("len", "u8", None)], None);
        let record = decode(&schema, &[0xde, 0xad, 0x01, 7]).unwrap();

        assert_eq!(record.get("mac"), Some(&FieldValue::Bytes(&[0xde, 0xad, 0x01])));
        assert_eq!(record.to_string(), "mac=dead01 len=7");
        assert_eq!(record.to_json().unwrap(), r#"{"mac":"dead01","len":7}"#);
    }

    #[test]
    fn test_floats() {
        let schema = schema(&[("ratio", "float", None), ("avg", "double", None)], None);
        let mut raw = Vec::new();
        raw.extend_from_slice(&0.5f32.to_ne_bytes());
        raw.extend_from_slice(&2.25f64.to_ne_bytes());

        let record = decode(&schema, &raw).unwrap();
        assert_eq!(record.get("ratio"), Some(&FieldValue::Float(0.5)));
        assert_eq!(record.get("avg"), Some(&FieldValue::Float(2.25)));
    }

    #[test]
    fn test_json_keeps_schema_order() {
        let schema = schema(&[("z", "u8", None), ("a", "u8", None), ("m", "u8", None)], None);
        let record = decode(&schema, &[3, 1, 2]).unwrap();
        assert_eq!(record.to_json().unwrap(), r#"{"z":3,"a":1,"m":2}"#);
    }

    #[test]
    fn test_truncated_record() {
        let schema = schema(&[("pid", "u32", None), ("tid", "u32", None)], None);
        let err = decode(&schema, &[1, 0, 0, 0]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { expected: 8, actual: 4 });
    }

    #[test]
    fn test_padding_after_record_accepted() {
        let schema = schema(&[("pid", "u32", None)], None);
        let record = decode(&schema, &[2, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(record.get("pid"), Some(&FieldValue::Unsigned(u64::from(u32::from_ne_bytes([2, 0, 0, 0])))));
    }

    proptest! {
        #[test]
        fn prop_decoding_is_pure(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let schema = schema(
                &[("pid", "u32", None), ("ts", "u64", None), ("comm", "char[8]", None), ("ret", "i16", None)],
                None,
            );
            let first = decode(&schema, &raw);
            let second = decode(&schema, &raw);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_u64_round_trips_native_endian(value in any::<u64>()) {
            let schema = schema(&[("v", "u64", None)], None);
            let raw = value.to_ne_bytes();
            let record = decode(&schema, &raw).unwrap();
            prop_assert_eq!(record.get("v"), Some(&FieldValue::Unsigned(value)));
        }
    }
}
