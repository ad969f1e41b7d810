//! Format adapters for import/export.
//!
//! Each format provides a [`RowSource`] for decoding and a [`RecordSink`] for
//! encoding. [`create_row_source`] and [`create_record_sink`] dispatch on
//! [`Format`].

pub mod csv;
pub mod excel;
pub mod json;
pub mod xml;

use crate::schema::ResolvedProfile;
use crate::{Error, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use super::traits::{RecordSink, RowSource};

/// Supported payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// JSON document with an `items` array.
    Json,
    /// CSV with a header row.
    Csv,
    /// Spreadsheet workbook (xlsx).
    Excel,
    /// XML document with one `item` element per record.
    Xml,
}

impl Format {
    /// Returns all formats.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Json, Self::Csv, Self::Excel, Self::Xml]
    }

    /// Returns the identifier used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Xml => "xml",
        }
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Excel => "xlsx",
            Self::Xml => "xml",
        }
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xml => "application/xml",
        }
    }

    /// Returns whether the format can carry nested collections.
    #[must_use]
    pub const fn supports_collections(&self) -> bool {
        !matches!(self, Self::Csv)
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "excel" | "xlsx" => Ok(Self::Excel),
            "xml" => Ok(Self::Xml),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a decoded cell: trims it and treats blank as absent.
pub(crate) fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Creates a row source for the profile's format.
///
/// JSON, XML and spreadsheet payloads are parsed here, so container-level
/// corruption is reported before any row is read.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the payload cannot be opened.
pub fn create_row_source<'a, R: BufRead + Send + 'a>(
    reader: R,
    profile: &ResolvedProfile,
) -> Result<Box<dyn RowSource + 'a>> {
    match profile.format {
        Format::Json => Ok(Box::new(json::JsonRowSource::new(reader, profile.clone())?)),
        Format::Csv => Ok(Box::new(csv::CsvRowSource::new(reader, profile)?)),
        Format::Excel => Ok(Box::new(excel::decode(reader, profile)?)),
        Format::Xml => Ok(Box::new(xml::decode(reader, profile)?)),
    }
}

/// Creates a record sink for the profile's format.
pub fn create_record_sink<'a, W: Write + Send + 'a>(
    writer: W,
    profile: &ResolvedProfile,
) -> Box<dyn RecordSink + 'a> {
    match profile.format {
        Format::Json => Box::new(json::JsonRecordSink::new(writer, profile.clone())),
        Format::Csv => Box::new(csv::CsvRecordSink::new(writer, profile.clone())),
        Format::Excel => Box::new(excel::ExcelRecordSink::new(writer, profile.clone())),
        Format::Xml => Box::new(xml::XmlRecordSink::new(writer, profile.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", Format::Json ; "json")]
    #[test_case("CSV", Format::Csv ; "csv upper")]
    #[test_case("excel", Format::Excel ; "excel")]
    #[test_case("xlsx", Format::Excel ; "xlsx alias")]
    #[test_case(" xml ", Format::Xml ; "xml padded")]
    fn test_format_from_str(input: &str, expected: Format) {
        assert_eq!(Format::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_format_names_value() {
        let err = Format::from_str("yaml").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref v) if v == "yaml"));
        assert_eq!(err.to_string(), "unsupported format: 'yaml'");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            Format::from_path(Path::new("customers.xlsx")).unwrap(),
            Format::Excel
        );
        assert_eq!(Format::from_path(Path::new("a.CSV")).unwrap(), Format::Csv);
        assert!(Format::from_path(Path::new("a.txt")).is_err());
        assert!(Format::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(Format::Excel.extension(), "xlsx");
        assert_eq!(Format::Excel.to_string(), "excel");
        assert_eq!(Format::Json.mime_type(), "application/json");
        assert!(!Format::Csv.supports_collections());
        assert!(Format::Xml.supports_collections());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  a "), Some("a".to_string()));
        assert_eq!(normalize("   "), None);
    }
}
