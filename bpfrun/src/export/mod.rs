//! Export pipeline: schema resolution, record decoding and sinks
//!
//! ```text
//! declared fields ──resolve──▶ ExportSchema (once per instance)
//! raw record ──decode(schema)──▶ DecodedRecord ──▶ ExportSink (text / callback / JSON)
//! ```

pub mod decoder;
pub mod schema;
pub mod sink;

pub use decoder::{decode, DecodedRecord, FieldValue};
pub use schema::{ExportField, ExportSchema, FieldType};
pub use sink::{ExportSink, TextPrinter};
