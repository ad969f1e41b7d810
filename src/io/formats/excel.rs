//! Spreadsheet (xlsx) format adapter.
//!
//! The workbook has one sheet named after the profile with the same columns as
//! CSV, plus one sheet per nested collection. A collection sheet starts with
//! the collection's parent-link column, holding the parent's natural key,
//! followed by the item fields.
//!
//! Written workbooks use inline strings, numeric cells for integer and decimal
//! fields, and boolean cells for boolean fields. Reading also understands the
//! shared-string table that spreadsheet applications write.

use super::normalize;
use super::xml::{Element, parse_document};
use crate::io::traits::{BufferedRows, RecordSink};
use crate::models::{ExchangeRecord, Row, Translation};
use crate::schema::{FieldDescriptor, FieldKind, ResolvedProfile, parse_bool};
use crate::{Error, Result};
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{BufRead, Cursor, Read, Write};
use tracing::warn;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

const SHEET_NAME_MAX: usize = 31;
/// Columns per sheet; the last one is `XFD`.
const COLUMN_MAX: usize = 16_384;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

fn sheet_name(name: &str) -> String {
    name.chars().take(SHEET_NAME_MAX).collect()
}

/// Zero-based column index to letters (`0` is `A`, `26` is `AA`).
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        #[allow(clippy::cast_possible_truncation)]
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Zero-based column index from a cell reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .iter()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?.checked_add(usize::from(b - b'A' + 1))
        })
        .map(|n| n - 1)
}

#[derive(Debug, Clone)]
enum Cell {
    Text(String),
    Number(String),
    Bool(bool),
    Blank,
}

impl Cell {
    fn typed(kind: FieldKind, value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Blank;
        };
        match kind {
            FieldKind::Integer | FieldKind::Decimal
                if value.parse::<f64>().is_ok_and(f64::is_finite) =>
            {
                Self::Number(value.to_string())
            },
            FieldKind::Boolean => {
                parse_bool(value).map_or_else(|| Self::Text(value.to_string()), Self::Bool)
            },
            _ => Self::Text(value.to_string()),
        }
    }
}

struct Sheet {
    name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn with_header(name: &str, header: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: sheet_name(name),
            rows: vec![header.into_iter().map(Cell::Text).collect()],
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = format!("{XML_DECL}<worksheet xmlns=\"{MAIN_NS}\"><sheetData>");
        for (r, row) in self.rows.iter().enumerate() {
            let row_number = r + 1;
            let _ = write!(xml, "<row r=\"{row_number}\">");
            for (c, cell) in row.iter().enumerate() {
                let reference = format!("{}{row_number}", column_letters(c));
                let _ = match cell {
                    Cell::Blank => Ok(()),
                    Cell::Text(text) => write!(
                        xml,
                        "<c r=\"{reference}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                        escape(text.as_str())
                    ),
                    Cell::Number(n) => write!(xml, "<c r=\"{reference}\"><v>{n}</v></c>"),
                    Cell::Bool(b) => {
                        write!(xml, "<c r=\"{reference}\" t=\"b\"><v>{}</v></c>", u8::from(*b))
                    },
                };
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
         <Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>"
    );
    for i in 1..=sheet_count {
        let _ = write!(
            xml,
            "<Override PartName=\"/xl/worksheets/sheet{i}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
        );
    }
    xml.push_str("</Types>");
    xml
}

fn workbook(sheets: &[Sheet]) -> (String, String) {
    let mut book = format!("{XML_DECL}<workbook xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><sheets>");
    let mut rels = format!("{XML_DECL}<Relationships xmlns=\"{PKG_REL_NS}\">");
    for (i, sheet) in sheets.iter().enumerate() {
        let id = i + 1;
        let _ = write!(
            book,
            "<sheet name=\"{}\" sheetId=\"{id}\" r:id=\"rId{id}\"/>",
            escape(sheet.name.as_str())
        );
        let _ = write!(
            rels,
            "<Relationship Id=\"rId{id}\" Type=\"{REL_NS}/worksheet\" Target=\"worksheets/sheet{id}.xml\"/>"
        );
    }
    let styles_id = sheets.len() + 1;
    let _ = write!(
        rels,
        "<Relationship Id=\"rId{styles_id}\" Type=\"{REL_NS}/styles\" Target=\"styles.xml\"/>"
    );
    book.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");
    (book, rels)
}

fn styles() -> String {
    format!(
        "{XML_DECL}<styleSheet xmlns=\"{MAIN_NS}\">\
         <fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
         <fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill></fills>\
         <borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
         <cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
         <cellXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/></cellXfs>\
         </styleSheet>"
    )
}

fn package(sheets: &[Sheet]) -> Result<Vec<u8>> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let (book, book_rels) = workbook(sheets);

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), content_types(sheets.len())),
        (
            "_rels/.rels".to_string(),
            format!(
                "{XML_DECL}<Relationships xmlns=\"{PKG_REL_NS}\"><Relationship Id=\"rId1\" Type=\"{REL_NS}/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>"
            ),
        ),
        ("xl/workbook.xml".to_string(), book),
        ("xl/_rels/workbook.xml.rels".to_string(), book_rels),
        ("xl/styles.xml".to_string(), styles()),
    ];
    for (i, sheet) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet.to_xml()));
    }

    for (name, content) in parts {
        archive.start_file(name.as_str(), options)
            .map_err(|e| Error::operation("write_xlsx", e))?;
        archive.write_all(content.as_bytes())
            .map_err(|e| Error::operation("write_xlsx", e))?;
    }
    let cursor = archive.finish().map_err(|e| Error::operation("finish_xlsx", e))?;
    Ok(cursor.into_inner())
}

/// Spreadsheet record sink.
///
/// A workbook cannot be written incrementally, so rows are buffered and the
/// archive is produced on [`finalize`](RecordSink::finalize).
pub struct ExcelRecordSink<W: Write> {
    writer: W,
    profile: ResolvedProfile,
    main: Sheet,
    collections: Vec<Sheet>,
}

impl<W: Write> ExcelRecordSink<W> {
    /// Creates a new spreadsheet sink.
    #[must_use]
    pub fn new(writer: W, profile: ResolvedProfile) -> Self {
        let main = Sheet::with_header(profile.profile.name(), profile.columns());
        let tenant = profile.profile.tenant_field().map(String::from);
        let collections = profile
            .profile
            .collections()
            .iter()
            .map(|c| {
                Sheet::with_header(
                    &c.name,
                    std::iter::once(c.parent_link.clone())
                        .chain(tenant.clone())
                        .chain(c.fields.iter().map(|f| f.name.clone())),
                )
            })
            .collect();
        Self {
            writer,
            profile,
            main,
            collections,
        }
    }
}

fn typed_row(fields: &[FieldDescriptor], record: &ExchangeRecord) -> Vec<Cell> {
    fields
        .iter()
        .map(|f| Cell::typed(f.kind, record.get(&f.name)))
        .collect()
}

impl<W: Write + Send> RecordSink for ExcelRecordSink<W> {
    fn write(&mut self, record: &ExchangeRecord) -> Result<()> {
        let profile = &self.profile.profile;
        let mut row = typed_row(profile.fields(), record);
        for field in profile.localized_fields() {
            for culture in self.profile.localization.extra_cultures() {
                row.push(
                    record
                        .translation(culture, &field.name)
                        .map_or(Cell::Blank, |v| Cell::Text(v.to_string())),
                );
            }
        }
        self.main.rows.push(row);

        let parent_key = profile.natural_key(record).unwrap_or_default();
        let tenant = profile
            .tenant_field()
            .map(|f| record.get(f).map_or(Cell::Blank, |t| Cell::Text(t.to_string())));
        for (collection, sheet) in profile.collections().iter().zip(&mut self.collections) {
            for item in record.collection(&collection.name).unwrap_or_default() {
                let mut row = vec![Cell::Text(parent_key.clone())];
                row.extend(tenant.clone());
                row.extend(typed_row(&collection.fields, item));
                sheet.rows.push(row);
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        let Self {
            mut writer,
            main,
            collections,
            ..
        } = *self;
        let mut sheets = Vec::with_capacity(collections.len() + 1);
        sheets.push(main);
        sheets.extend(collections);

        let bytes = package(&sheets)?;
        writer
            .write_all(&bytes)
            .map_err(|e| Error::operation("write_xlsx", e))?;
        writer
            .flush()
            .map_err(|e| Error::operation("flush_xlsx", e))
    }
}

/// An opened workbook.
struct Workbook {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    shared_strings: Vec<String>,
    /// Sheet names and part paths, in workbook order.
    sheets: Vec<(String, String)>,
}

fn malformed(e: impl std::fmt::Display) -> Error {
    Error::MalformedPayload(format!("unreadable workbook: {e}"))
}

impl Workbook {
    fn open(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;
        let mut workbook = Self {
            archive,
            shared_strings: Vec::new(),
            sheets: Vec::new(),
        };

        let book = workbook
            .part("xl/workbook.xml")?
            .ok_or_else(|| malformed("missing xl/workbook.xml"))?;
        let book = parse_document(&book)?;
        let rels = match workbook.part("xl/_rels/workbook.xml.rels")? {
            Some(bytes) => parse_document(&bytes)?,
            None => Element::default(),
        };
        let targets: HashMap<&str, &str> = rels
            .children_named("Relationship")
            .filter_map(|r| Some((r.attr("Id")?, r.attr("Target")?)))
            .collect();

        if let Some(sheets) = book.child("sheets") {
            for sheet in sheets.children_named("sheet") {
                let (Some(name), Some(id)) = (sheet.attr("name"), sheet.attr("r:id")) else {
                    continue;
                };
                let Some(target) = targets.get(id) else {
                    continue;
                };
                let path = target
                    .strip_prefix('/')
                    .map_or_else(|| format!("xl/{target}"), String::from);
                workbook.sheets.push((name.to_string(), path));
            }
        }
        if workbook.sheets.is_empty() {
            return Err(malformed("workbook has no sheets"));
        }

        if let Some(bytes) = workbook.part("xl/sharedStrings.xml")? {
            let table = parse_document(&bytes)?;
            workbook.shared_strings = table.children_named("si").map(Element::deep_text).collect();
        }
        Ok(workbook)
    }

    fn part(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).map_err(malformed)?;
                Ok(Some(bytes))
            },
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(malformed(e)),
        }
    }

    /// Reads a sheet into rows of cell text. Blank rows are dropped.
    fn table(&mut self, path: &str) -> Result<Vec<Vec<String>>> {
        let bytes = self
            .part(path)?
            .ok_or_else(|| malformed(format!("missing sheet part {path}")))?;
        let sheet = parse_document(&bytes)?;
        let Some(data) = sheet.child("sheetData") else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for row in data.children_named("row") {
            let mut cells: Vec<String> = Vec::new();
            for cell in row.children_named("c") {
                let index = cell
                    .attr("r")
                    .and_then(column_index)
                    .unwrap_or(cells.len());
                if index >= COLUMN_MAX {
                    return Err(malformed(format!(
                        "cell {} is beyond column {}",
                        cell.attr("r").unwrap_or_default(),
                        column_letters(COLUMN_MAX - 1)
                    )));
                }
                if cells.len() <= index {
                    cells.resize(index + 1, String::new());
                }
                cells[index] = self.cell_text(cell);
            }
            if cells.iter().any(|c| !c.trim().is_empty()) {
                rows.push(cells);
            }
        }
        Ok(rows)
    }

    fn cell_text(&self, cell: &Element) -> String {
        let value = || cell.child("v").map(|v| v.text.clone()).unwrap_or_default();
        match cell.attr("t") {
            Some("s") => value()
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.shared_strings.get(i).cloned())
                .unwrap_or_default(),
            Some("inlineStr") => cell.child("is").map(Element::deep_text).unwrap_or_default(),
            Some("b") => match value().trim() {
                "1" => "true".to_string(),
                "0" => "false".to_string(),
                other => other.to_string(),
            },
            _ => value(),
        }
    }

    fn find_sheet(&self, name: &str) -> Option<&str> {
        let name = sheet_name(name);
        self.sheets
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
            .map(|(_, p)| p.as_str())
    }
}

enum Column {
    Field(String),
    Translation { field: String, culture: String },
    Ignored,
}

/// Decodes a workbook into rows.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the archive or its workbook parts
/// cannot be read.
pub fn decode<R: BufRead>(mut reader: R, profile: &ResolvedProfile) -> Result<BufferedRows> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::operation("read_xlsx", e))?;
    if bytes.is_empty() {
        return Ok(BufferedRows::new(Vec::new()));
    }

    let mut workbook = Workbook::open(bytes)?;
    let main_path = workbook
        .find_sheet(profile.profile.name())
        .map_or_else(|| workbook.sheets[0].1.clone(), String::from);
    let mut table = workbook.table(&main_path)?.into_iter();

    let Some(header) = table.next() else {
        return Ok(BufferedRows::new(Vec::new()));
    };
    let columns: Vec<Column> = header
        .iter()
        .map(|h| {
            let h = h.trim();
            if let Some(field) = profile.profile.field_ignore_case(h) {
                Column::Field(field.name.clone())
            } else if let Some((field, culture)) = profile.parse_translation_column(h) {
                Column::Translation { field, culture }
            } else {
                Column::Ignored
            }
        })
        .collect();

    let mut rows: Vec<Row> = table
        .enumerate()
        .map(|(i, cells)| {
            let mut record = ExchangeRecord::new();
            for (column, value) in columns.iter().zip(cells) {
                let Some(value) = normalize(&value) else {
                    continue;
                };
                match column {
                    Column::Field(name) => record.set(name.clone(), value),
                    Column::Translation { field, culture } => record
                        .translations
                        .push(Translation::new(culture.clone(), field.clone(), value)),
                    Column::Ignored => {},
                }
            }
            Row::new(i + 1, record)
        })
        .collect();

    let tenant_field = profile.profile.tenant_field();
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let Some(key) = profile.profile.natural_key(&row.record) {
            by_key.entry(key.to_lowercase()).or_default().push(i);
        }
    }

    for collection in profile.profile.collections() {
        let Some(path) = workbook.find_sheet(&collection.name).map(String::from) else {
            continue;
        };
        for indexes in by_key.values() {
            for &i in indexes {
                rows[i]
                    .record
                    .collections
                    .insert(collection.name.clone(), Vec::new());
            }
        }

        let mut table = workbook.table(&path)?.into_iter();
        let Some(header) = table.next() else {
            continue;
        };
        let mut link = None;
        let mut tenant_column = None;
        let mut item_columns: Vec<Option<String>> = Vec::with_capacity(header.len());
        for (i, h) in header.iter().enumerate() {
            let h = h.trim();
            if h.eq_ignore_ascii_case(&collection.parent_link) {
                link = Some(i);
                item_columns.push(None);
            } else if tenant_field.is_some_and(|t| h.eq_ignore_ascii_case(t)) {
                tenant_column = Some(i);
                item_columns.push(None);
            } else {
                item_columns.push(
                    collection
                        .fields
                        .iter()
                        .find(|f| f.name.eq_ignore_ascii_case(h))
                        .map(|f| f.name.clone()),
                );
            }
        }
        let Some(link) = link else {
            warn!(
                sheet = collection.name.as_str(),
                column = collection.parent_link.as_str(),
                "Collection sheet has no parent-link column, ignoring it"
            );
            continue;
        };

        for cells in table {
            let parent = cells
                .get(link)
                .and_then(|v| normalize(v))
                .map(|v| v.to_lowercase());
            let tenant = tenant_column.and_then(|c| cells.get(c)).and_then(|v| normalize(v));
            let targets: Vec<usize> = parent
                .as_ref()
                .and_then(|k| by_key.get(k))
                .into_iter()
                .flatten()
                .copied()
                .filter(|&i| same_tenant(&rows[i].record, tenant_field, tenant.as_deref()))
                .collect();
            if targets.is_empty() {
                warn!(
                    sheet = collection.name.as_str(),
                    parent = parent.as_deref().unwrap_or(""),
                    "Collection row has no matching parent row"
                );
                continue;
            }
            let mut item = ExchangeRecord::new();
            for (name, value) in item_columns.iter().zip(&cells) {
                if let (Some(name), Some(value)) = (name, normalize(value)) {
                    item.set(name.clone(), value);
                }
            }
            for i in targets {
                if let Some(items) = rows[i].record.collections.get_mut(&collection.name) {
                    items.push(item.clone());
                }
            }
        }
    }

    Ok(BufferedRows::new(rows))
}

/// Whether a collection row's tenant, when both sides carry one, names the parent's tenant.
fn same_tenant(parent: &ExchangeRecord, field: Option<&str>, tenant: Option<&str>) -> bool {
    match (field.and_then(|f| parent.get(f)), tenant) {
        (Some(own), Some(tenant)) => own.eq_ignore_ascii_case(tenant),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Format;
    use crate::io::traits::RowSource;
    use crate::schema::{CollectionDescriptor, ExchangeProfile, Localization};
    use std::sync::Arc;

    fn profile() -> ResolvedProfile {
        let profile = ExchangeProfile::builder("customers")
            .key_field("userId")
            .field(FieldDescriptor::text("userId"))
            .field(FieldDescriptor::text("firstName").localized())
            .field(FieldDescriptor::decimal("totalSpent"))
            .field(FieldDescriptor::boolean("verified"))
            .collection(
                CollectionDescriptor::new("addresses")
                    .parent_link("userId")
                    .field(FieldDescriptor::text("label"))
                    .field(FieldDescriptor::text("city")),
            )
            .build()
            .unwrap();
        ResolvedProfile::new(
            Arc::new(profile),
            Format::Excel,
            Localization::new(["en", "ru"], "en"),
        )
    }

    fn storefront_profile() -> ResolvedProfile {
        let profile = ExchangeProfile::builder("customers")
            .key_field("userId")
            .tenant_field("storefrontId")
            .field(FieldDescriptor::text("storefrontId"))
            .field(FieldDescriptor::text("userId"))
            .collection(
                CollectionDescriptor::new("addresses")
                    .parent_link("userId")
                    .field(FieldDescriptor::text("city")),
            )
            .build()
            .unwrap();
        ResolvedProfile::new(Arc::new(profile), Format::Excel, Localization::default())
    }

    fn encode(records: &[ExchangeRecord]) -> Vec<u8> {
        encode_with(profile(), records)
    }

    fn encode_with(profile: ResolvedProfile, records: &[ExchangeRecord]) -> Vec<u8> {
        let mut output = Vec::new();
        {
            let mut sink = Box::new(ExcelRecordSink::new(&mut output, profile));
            for record in records {
                sink.write(record).unwrap();
            }
            sink.finalize().unwrap();
        }
        output
    }

    fn decode_all(bytes: Vec<u8>) -> Vec<Row> {
        decode_with(&profile(), bytes)
    }

    fn decode_with(profile: &ResolvedProfile, bytes: Vec<u8>) -> Vec<Row> {
        let mut source = decode(Cursor::new(bytes), profile).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = source.next().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("aa10"), Some(26));
        assert_eq!(column_index("ZZ3"), Some(701));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn test_workbook_round_trip() {
        let bytes = encode(&[
            ExchangeRecord::new()
                .with("userId", "u1")
                .with("firstName", "Ann & <Co>")
                .with("totalSpent", "12.5")
                .with("verified", "yes")
                .with_translation(Translation::new("ru", "firstName", "Анна"))
                .with_collection(
                    "addresses",
                    vec![
                        ExchangeRecord::new().with("label", "Home").with("city", "Riga"),
                        ExchangeRecord::new().with("label", "Work"),
                    ],
                ),
            ExchangeRecord::new().with("userId", "u2"),
        ]);

        let rows = decode_all(bytes);
        assert_eq!(rows.len(), 2);
        let first = &rows[0].record;
        assert_eq!(first.get("firstName"), Some("Ann & <Co>"));
        assert_eq!(first.get("totalSpent"), Some("12.5"));
        assert_eq!(first.get("verified"), Some("true"));
        assert_eq!(first.translation("ru", "firstName"), Some("Анна"));
        let addresses = first.collection("addresses").unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].get("city"), Some("Riga"));
        assert!(!addresses[1].has("city"));

        let second = &rows[1].record;
        assert_eq!(rows[1].number, 2);
        assert_eq!(second.collection("addresses").map(<[_]>::len), Some(0));
    }

    #[test]
    fn test_collection_rows_follow_parent_tenant() {
        let address = |city: &str| vec![ExchangeRecord::new().with("city", city)];
        let bytes = encode_with(
            storefront_profile(),
            &[
                ExchangeRecord::new()
                    .with("storefrontId", "s-a")
                    .with("userId", "u1")
                    .with_collection("addresses", address("Riga")),
                ExchangeRecord::new()
                    .with("storefrontId", "s-b")
                    .with("userId", "u1")
                    .with_collection("addresses", address("Tartu")),
            ],
        );

        let rows = decode_with(&storefront_profile(), bytes);
        let cities: Vec<Vec<&str>> = rows
            .iter()
            .map(|row| {
                row.record
                    .collection("addresses")
                    .unwrap()
                    .iter()
                    .filter_map(|a| a.get("city"))
                    .collect()
            })
            .collect();
        assert_eq!(cities, vec![vec!["Riga"], vec!["Tartu"]]);
    }

    #[test]
    fn test_empty_workbook_has_header_only() {
        let rows = decode_all(encode(&[]));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_not_a_workbook() {
        let result = decode(Cursor::new(b"plain text".to_vec()), &profile());
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }

    /// Packages a single-sheet workbook from raw parts.
    fn raw_workbook(sheet_data: &str, shared_strings: Option<&str>) -> Vec<u8> {
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        let mut parts = vec![
            (
                "xl/workbook.xml",
                format!(r#"<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                format!(r#"<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="x" Target="/xl/worksheets/sheet1.xml"/></Relationships>"#),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(r#"<worksheet xmlns="{MAIN_NS}"><sheetData>{sheet_data}</sheetData></worksheet>"#),
            ),
        ];
        if let Some(strings) = shared_strings {
            parts.push((
                "xl/sharedStrings.xml",
                format!(r#"<sst xmlns="{MAIN_NS}">{strings}</sst>"#),
            ));
        }
        for (name, content) in parts {
            archive.start_file(name, options).unwrap();
            archive.write_all(content.as_bytes()).unwrap();
        }
        archive.finish().unwrap().into_inner()
    }

    #[test]
    fn test_shared_strings() {
        let bytes = raw_workbook(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2"><v>42</v></c><c r="B2" t="s"><v>2</v></c></row>"#,
            Some("<si><t>userId</t></si><si><t>firstName</t></si><si><r><t>An</t></r><r><t>n</t></r></si>"),
        );

        let rows = decode_all(bytes);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.get("userId"), Some("42"));
        assert_eq!(rows[0].record.get("firstName"), Some("Ann"));
    }

    #[test]
    fn test_cell_beyond_last_column_is_malformed() {
        let bytes = raw_workbook(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>userId</t></is></c><c r="ZZZZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row>"#,
            None,
        );

        let result = decode(Cursor::new(bytes), &profile());
        assert!(matches!(result, Err(Error::MalformedPayload(ref m)) if m.contains("XFD")));
    }

    #[test]
    fn test_last_column_is_accepted() {
        let bytes = raw_workbook(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>userId</t></is></c><c r="XFD1" t="inlineStr"><is><t>extra</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>u1</t></is></c></row>"#,
            None,
        );

        let rows = decode_all(bytes);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.get("userId"), Some("u1"));
    }
}
