//! CSV format adapter.
//!
//! One header row of field names, then one row per record. Localized fields
//! get an extra `<field>:<culture>` column per non-default culture. CSV cannot
//! carry nested collections, so they are neither written nor read.

use super::normalize;
use crate::io::traits::{RecordSink, RowSource};
use crate::models::{ExchangeRecord, Row, Translation};
use crate::schema::ResolvedProfile;
use crate::{Error, Result};
use std::io::{BufRead, Write};
use tracing::debug;

/// What a header column maps to.
#[derive(Debug, Clone)]
enum Column {
    Field(String),
    Translation { field: String, culture: String },
    Ignored,
}

/// CSV row source.
///
/// Reads records lazily. Header names are matched case-insensitively;
/// unknown columns are ignored.
pub struct CsvRowSource<R: BufRead> {
    reader: csv::Reader<R>,
    columns: Vec<Column>,
    number: usize,
}

impl<R: BufRead> CsvRowSource<R> {
    /// Creates a new CSV row source and reads the header row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the header row cannot be read.
    pub fn new(reader: R, profile: &ResolvedProfile) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| Error::MalformedPayload(format!("unreadable CSV header: {e}")))?
            .clone();

        let columns: Vec<Column> = headers
            .iter()
            .map(|header| {
                if let Some(field) = profile.profile.field_ignore_case(header) {
                    Column::Field(field.name.clone())
                } else if let Some((field, culture)) = profile.parse_translation_column(header) {
                    Column::Translation { field, culture }
                } else {
                    debug!(column = header, "Ignoring unknown CSV column");
                    Column::Ignored
                }
            })
            .collect();

        Ok(Self {
            reader: csv_reader,
            columns,
            number: 0,
        })
    }

    fn decode(&self, record: &csv::StringRecord) -> ExchangeRecord {
        let mut decoded = ExchangeRecord::new();
        for (column, value) in self.columns.iter().zip(record.iter()) {
            let Some(value) = normalize(value) else {
                continue;
            };
            match column {
                Column::Field(name) => decoded.set(name.clone(), value),
                Column::Translation { field, culture } => decoded
                    .translations
                    .push(Translation::new(culture.clone(), field.clone(), value)),
                Column::Ignored => {},
            }
        }
        decoded
    }
}

impl<R: BufRead + Send> RowSource for CsvRowSource<R> {
    fn next(&mut self) -> Result<Option<Row>> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                self.number += 1;
                Ok(Some(Row::new(self.number, self.decode(&record))))
            },
            Err(e) if e.is_io_error() => Err(Error::operation("read_csv", e)),
            Err(e) => {
                self.number += 1;
                Ok(Some(Row::malformed(self.number, format!("unreadable CSV row: {e}"))))
            },
        }
    }
}

/// CSV record sink.
///
/// Writes the header row on first write (or on finalize for an empty export).
pub struct CsvRecordSink<W: Write> {
    writer: csv::Writer<W>,
    profile: ResolvedProfile,
    headers_written: bool,
}

impl<W: Write> CsvRecordSink<W> {
    /// Creates a new CSV sink.
    #[must_use]
    pub fn new(writer: W, profile: ResolvedProfile) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        Self {
            writer,
            profile,
            headers_written: false,
        }
    }

    fn ensure_headers(&mut self) -> Result<()> {
        if !self.headers_written {
            self.writer
                .write_record(self.profile.columns())
                .map_err(|e| Error::operation("write_csv_headers", e))?;
            self.headers_written = true;
        }
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for CsvRecordSink<W> {
    fn write(&mut self, record: &ExchangeRecord) -> Result<()> {
        self.ensure_headers()?;

        let profile = &self.profile.profile;
        let mut row: Vec<&str> = profile
            .field_names()
            .map(|name| record.get(name).unwrap_or(""))
            .collect();
        for field in profile.localized_fields() {
            for culture in self.profile.localization.extra_cultures() {
                row.push(record.translation(culture, &field.name).unwrap_or(""));
            }
        }

        self.writer
            .write_record(&row)
            .map_err(|e| Error::operation("write_csv", e))?;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.ensure_headers()?;
        self.writer
            .flush()
            .map_err(|e| Error::operation("flush_csv", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Format;
    use crate::schema::{ExchangeProfile, FieldDescriptor, Localization};
    use std::io::Cursor;
    use std::sync::Arc;

    fn profile() -> ResolvedProfile {
        let profile = ExchangeProfile::builder("addresses")
            .key_field("label")
            .field(FieldDescriptor::text("label").localized())
            .field(FieldDescriptor::text("country"))
            .field(FieldDescriptor::text("city"))
            .build()
            .unwrap();
        ResolvedProfile::new(
            Arc::new(profile),
            Format::Csv,
            Localization::new(["en", "ru"], "en"),
        )
    }

    #[test]
    fn test_import_basic_csv() {
        let input = "Label,COUNTRY,city,label:ru,notes\nHome,LV,\"Riga\",Дом,x\nWork,,Tallinn\n";
        let mut source = CsvRowSource::new(Cursor::new(input), &profile()).unwrap();

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(first.record.get("label"), Some("Home"));
        assert_eq!(first.record.get("country"), Some("LV"));
        assert_eq!(first.record.translation("ru", "label"), Some("Дом"));
        assert!(!first.record.has("notes"));

        let second = source.next().unwrap().unwrap();
        assert_eq!(second.number, 2);
        assert!(!second.record.has("country"), "blank cells are absent");
        assert_eq!(second.record.get("city"), Some("Tallinn"));

        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_row_does_not_stop_decoding() {
        let mut input = b"label,country,city\nHome,LV,Riga\n".to_vec();
        input.extend_from_slice(b"Bad,\xff\xfe,Nowhere\n");
        input.extend_from_slice(b"Work,EE,Tallinn\n");
        let mut source = CsvRowSource::new(Cursor::new(input), &profile()).unwrap();

        assert!(!source.next().unwrap().unwrap().is_malformed());
        let bad = source.next().unwrap().unwrap();
        assert!(bad.is_malformed());
        assert_eq!(bad.number, 2);
        let third = source.next().unwrap().unwrap();
        assert_eq!(third.number, 3);
        assert_eq!(third.record.get("city"), Some("Tallinn"));
    }

    #[test]
    fn test_export_csv() {
        let mut output = Vec::new();
        {
            let mut sink = Box::new(CsvRecordSink::new(&mut output, profile()));
            sink.write(
                &ExchangeRecord::new()
                    .with("label", "Home")
                    .with("city", "Riga, old town")
                    .with_translation(Translation::new("ru", "label", "Дом")),
            )
            .unwrap();
            sink.finalize().unwrap();
        }
        let text = String::from_utf8(output).unwrap();
        assert_eq!(
            text,
            "label,country,city,label:ru\nHome,,\"Riga, old town\",Дом\n"
        );
    }

    #[test]
    fn test_empty_export_has_header() {
        let mut output = Vec::new();
        Box::new(CsvRecordSink::new(&mut output, profile()))
            .finalize()
            .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "label,country,city,label:ru\n");
    }
}
