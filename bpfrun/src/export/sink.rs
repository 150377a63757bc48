//! Where decoded records go
//!
//! The sink is picked once per `wait_and_export` call:
//! - [`ExportSink::Print`]: timestamped `name=value` lines (the default)
//! - [`ExportSink::Records`]: caller closure receiving each [`DecodedRecord`]
//! - [`ExportSink::Json`]: caller closure receiving each record as a JSON object string

use std::io::{self, Write};

use super::decoder::DecodedRecord;
use super::schema::ExportSchema;
use crate::domain::LifecycleError;

type RecordCallback<'a> = Box<dyn FnMut(&DecodedRecord<'_, '_>) + 'a>;
type JsonCallback<'a> = Box<dyn FnMut(&str) + 'a>;

/// Destination for decoded records
pub enum ExportSink<'a> {
    Print(TextPrinter<'a>),
    Records(RecordCallback<'a>),
    Json(JsonCallback<'a>),
}

impl<'a> ExportSink<'a> {
    /// Default printer writing to stdout
    #[must_use]
    pub fn stdout() -> ExportSink<'static> {
        ExportSink::Print(TextPrinter::new(Box::new(io::stdout())))
    }

    /// Default printer writing to any writer
    pub fn printer(out: impl Write + 'a) -> Self {
        Self::Print(TextPrinter::new(Box::new(out)))
    }

    pub fn records(callback: impl FnMut(&DecodedRecord<'_, '_>) + 'a) -> Self {
        Self::Records(Box::new(callback))
    }

    pub fn json(callback: impl FnMut(&str) + 'a) -> Self {
        Self::Json(Box::new(callback))
    }

    /// Called once before the first record of an export cycle
    pub(crate) fn begin(&mut self, schema: &ExportSchema, print_header: bool) -> io::Result<()> {
        match self {
            Self::Print(printer) if print_header => printer.write_header(schema),
            _ => Ok(()),
        }
    }

    pub(crate) fn deliver(&mut self, record: &DecodedRecord<'_, '_>) -> Result<(), LifecycleError> {
        match self {
            Self::Print(printer) => printer.write_record(record)?,
            Self::Records(callback) => callback(record),
            Self::Json(callback) => callback(&record.to_json()?),
        }
        Ok(())
    }
}

/// Line printer: `HH:MM:SS name=value name=value ...`
pub struct TextPrinter<'a> {
    out: Box<dyn Write + 'a>,
}

impl<'a> TextPrinter<'a> {
    #[must_use]
    pub fn new(out: Box<dyn Write + 'a>) -> Self {
        Self { out }
    }

    fn write_header(&mut self, schema: &ExportSchema) -> io::Result<()> {
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        writeln!(self.out, "TIME     {}", names.join(" "))?;
        self.out.flush()
    }

    fn write_record(&mut self, record: &DecodedRecord<'_, '_>) -> io::Result<()> {
        let now = chrono::Local::now();
        writeln!(self.out, "{} {record}", now.format("%H:%M:%S"))?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::decoder::decode;
    use crate::package::ExportFieldSpec;

    fn pid_comm_schema() -> ExportSchema {
        let specs = [
            ExportFieldSpec {
                name: "pid".to_string(),
                type_hint: "u32".to_string(),
                width: None,
                offset: None,
            },
            ExportFieldSpec {
                name: "comm".to_string(),
                type_hint: "char[4]".to_string(),
                width: None,
                offset: None,
            },
        ];
        ExportSchema::resolve("EVENTS", &specs, None).unwrap()
    }

    fn raw_record(pid: u32, comm: &[u8; 4]) -> Vec<u8> {
        let mut raw = pid.to_ne_bytes().to_vec();
        raw.extend_from_slice(comm);
        raw
    }

    #[test]
    fn test_printer_line_format() {
        let schema = pid_comm_schema();
        let raw = raw_record(42, b"sh\0\0");
        let record = decode(&schema, &raw).unwrap();

        let mut out = Vec::new();
        {
            let mut sink = ExportSink::printer(&mut out);
            sink.begin(&schema, true).unwrap();
            sink.deliver(&record).unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "TIME     pid comm");

        let (time, fields) = lines[1].split_once(' ').unwrap();
        assert_eq!(time.len(), 8);
        assert_eq!(time.matches(':').count(), 2);
        assert_eq!(fields, "pid=42 comm=sh");
    }

    #[test]
    fn test_header_skipped_when_disabled() {
        let schema = pid_comm_schema();
        let mut out = Vec::new();
        ExportSink::printer(&mut out).begin(&schema, false).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_json_sink() {
        let schema = pid_comm_schema();
        let raw = raw_record(7, b"init");
        let record = decode(&schema, &raw).unwrap();

        let mut received = Vec::new();
        {
            let mut sink = ExportSink::json(|json| received.push(json.to_string()));
            sink.deliver(&record).unwrap();
        }
        assert_eq!(received, vec![r#"{"pid":7,"comm":"init"}"#.to_string()]);
    }

    #[test]
    fn test_record_sink() {
        let schema = pid_comm_schema();
        let raw = raw_record(9, b"top\0");
        let record = decode(&schema, &raw).unwrap();

        let mut pids = Vec::new();
        {
            let mut sink = ExportSink::records(|r| pids.push(r.get("pid").map(ToString::to_string)));
            sink.deliver(&record).unwrap();
        }
        assert_eq!(pids, vec![Some("9".to_string())]);
    }
}
