//! JSON format adapter.
//!
//! Documents are an object with an `items` array, one object per record. A
//! bare top-level array is accepted on import. Nested collections are arrays
//! of objects under the collection name; translations travel as
//! `"translations": { "<culture>": { "<field>": "<value>" } }`.

use super::normalize;
use crate::io::traits::{RecordSink, RowSource};
use crate::models::{ExchangeRecord, Row, Translation};
use crate::schema::{FieldDescriptor, FieldKind, ResolvedProfile, parse_bool};
use crate::{Error, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::ops::Range;

const ITEMS_KEY: &str = "items";
const TRANSLATIONS_KEY: &str = "translations";

/// JSON row source.
///
/// The whole document is checked when the source is created, so a broken
/// document fails before any row is handed out. Items are only located then;
/// each one is materialized when its row is read.
pub struct JsonRowSource {
    content: String,
    items: std::vec::IntoIter<Range<usize>>,
    profile: ResolvedProfile,
    number: usize,
}

impl JsonRowSource {
    /// Checks a JSON document and locates its items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the document is not valid JSON or
    /// is neither an object with an `items` array nor an array.
    pub fn new<R: BufRead>(mut reader: R, profile: ResolvedProfile) -> Result<Self> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| Error::MalformedPayload(format!("JSON payload is not readable UTF-8: {e}")))?;

        let items = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str::<IgnoredAny>(&content)
                .map_err(|e| Error::MalformedPayload(format!("invalid JSON: {e}")))?;
            locate_items(&content)?
        };

        Ok(Self {
            content,
            items: items.into_iter(),
            profile,
            number: 0,
        })
    }
}

impl RowSource for JsonRowSource {
    fn next(&mut self) -> Result<Option<Row>> {
        let Some(span) = self.items.next() else {
            return Ok(None);
        };
        self.number += 1;
        let item = self
            .content
            .get(span)
            .ok_or_else(|| "item is out of bounds".to_string())
            .and_then(|text| serde_json::from_str::<Value>(text).map_err(|e| e.to_string()));
        Ok(Some(match item.and_then(|item| decode_item(&self.profile, item)) {
            Ok(record) => Row::new(self.number, record),
            Err(message) => Row::malformed(self.number, message),
        }))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// Byte spans of the record items in a syntactically valid document.
fn locate_items(content: &str) -> Result<Vec<Range<usize>>> {
    let bytes = content.as_bytes();
    let start = skip_whitespace(bytes, 0);
    match bytes.get(start) {
        Some(b'[') => Ok(array_elements(bytes, start)),
        Some(b'{') => match object_member(content, start, ITEMS_KEY)? {
            Some(at) if bytes.get(at) == Some(&b'[') => Ok(array_elements(bytes, at)),
            Some(at) if content.get(at..).is_some_and(|v| v.starts_with("null")) => Ok(Vec::new()),
            _ => Err(Error::MalformedPayload(
                "JSON document must have an 'items' array".to_string(),
            )),
        },
        _ => Err(Error::MalformedPayload(
            "JSON document must be an object or an array".to_string(),
        )),
    }
}

fn skip_whitespace(bytes: &[u8], mut at: usize) -> usize {
    while bytes.get(at).is_some_and(u8::is_ascii_whitespace) {
        at += 1;
    }
    at
}

/// End of the string starting at the quote at `at`, past the closing quote.
fn string_end(bytes: &[u8], mut at: usize) -> usize {
    at += 1;
    while let Some(&b) = bytes.get(at) {
        match b {
            b'\\' => at += 2,
            b'"' => return at + 1,
            _ => at += 1,
        }
    }
    at
}

/// End of the value starting at `at`.
fn value_end(bytes: &[u8], at: usize) -> usize {
    match bytes.get(at) {
        Some(b'"') => string_end(bytes, at),
        Some(b'[' | b'{') => {
            let mut depth = 0usize;
            let mut i = at;
            while let Some(&b) = bytes.get(i) {
                match b {
                    b'"' => {
                        i = string_end(bytes, i);
                        continue;
                    },
                    b'[' | b'{' => depth += 1,
                    b']' | b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return i + 1;
                        }
                    },
                    _ => {},
                }
                i += 1;
            }
            i
        },
        _ => {
            let mut i = at;
            while bytes
                .get(i)
                .is_some_and(|b| !matches!(b, b',' | b']' | b'}') && !b.is_ascii_whitespace())
            {
                i += 1;
            }
            i
        },
    }
}

/// Spans of the elements of the array opening at `at`.
fn array_elements(bytes: &[u8], at: usize) -> Vec<Range<usize>> {
    let mut elements = Vec::new();
    let mut i = skip_whitespace(bytes, at + 1);
    while bytes.get(i).is_some_and(|b| *b != b']') {
        let end = value_end(bytes, i);
        elements.push(i..end);
        i = skip_whitespace(bytes, end);
        if bytes.get(i) == Some(&b',') {
            i = skip_whitespace(bytes, i + 1);
        }
    }
    elements
}

/// Start of the value of member `name` in the object opening at `at`.
/// The last occurrence wins, as with a parsed map.
fn object_member(content: &str, at: usize, name: &str) -> Result<Option<usize>> {
    let bytes = content.as_bytes();
    let mut found = None;
    let mut i = skip_whitespace(bytes, at + 1);
    while bytes.get(i) == Some(&b'"') {
        let key_end = string_end(bytes, i);
        let key: String = content
            .get(i..key_end)
            .map(serde_json::from_str::<String>)
            .transpose()
            .map_err(|e| Error::MalformedPayload(format!("invalid JSON: {e}")))?
            .unwrap_or_default();
        i = skip_whitespace(bytes, key_end);
        i = skip_whitespace(bytes, i + 1);
        if key == name {
            found = Some(i);
        }
        i = skip_whitespace(bytes, value_end(bytes, i));
        if bytes.get(i) == Some(&b',') {
            i = skip_whitespace(bytes, i + 1);
        }
    }
    Ok(found)
}

fn decode_item(profile: &ResolvedProfile, item: Value) -> std::result::Result<ExchangeRecord, String> {
    let Value::Object(object) = item else {
        return Err("item is not a JSON object".to_string());
    };

    let mut record = ExchangeRecord::new();
    for (key, value) in object {
        if key.eq_ignore_ascii_case(TRANSLATIONS_KEY) {
            record.translations = decode_translations(profile, value)?;
        } else if let Some(collection) = profile
            .profile
            .collections()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&key))
        {
            match value {
                Value::Null => {},
                Value::Array(items) => {
                    let mut decoded = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        let Value::Object(fields) = item else {
                            return Err(format!("{}[{i}] is not a JSON object", collection.name));
                        };
                        decoded.push(decode_fields(&collection.fields, fields, &collection.name)?);
                    }
                    record.collections.insert(collection.name.clone(), decoded);
                },
                _ => return Err(format!("'{}' must be an array", collection.name)),
            }
        } else if let Some(field) = profile.profile.field_ignore_case(&key) {
            if let Some(value) = scalar(value, &field.name)? {
                record.set(field.name.clone(), value);
            }
        }
    }
    Ok(record)
}

fn decode_fields(
    fields: &[FieldDescriptor],
    object: Map<String, Value>,
    scope: &str,
) -> std::result::Result<ExchangeRecord, String> {
    let mut record = ExchangeRecord::new();
    for (key, value) in object {
        if let Some(field) = fields.iter().find(|f| f.name.eq_ignore_ascii_case(&key)) {
            if let Some(value) = scalar(value, &format!("{scope}.{}", field.name))? {
                record.set(field.name.clone(), value);
            }
        }
    }
    Ok(record)
}

fn decode_translations(
    profile: &ResolvedProfile,
    value: Value,
) -> std::result::Result<Vec<Translation>, String> {
    let cultures = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(cultures) => cultures,
        _ => return Err("'translations' must be an object keyed by culture".to_string()),
    };

    let mut translations = Vec::new();
    for (culture, fields) in cultures {
        let Some(culture) = profile.localization.resolve(&culture) else {
            continue;
        };
        let Value::Object(fields) = fields else {
            return Err(format!("translations for '{culture}' must be an object"));
        };
        for (name, value) in fields {
            let Some(field) = profile
                .profile
                .field_ignore_case(&name)
                .filter(|f| f.localized)
            else {
                continue;
            };
            if let Some(value) = scalar(value, &field.name)? {
                translations.push(Translation::new(culture, field.name.clone(), value));
            }
        }
    }
    Ok(translations)
}

/// Converts a JSON scalar to its textual form. `null` and blank strings are absent.
fn scalar(value: Value, field: &str) -> std::result::Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(normalize(&s)),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(format!("field '{field}' must be a scalar value")),
    }
}

/// Renders a stored value with the JSON type its kind implies.
///
/// Values that do not parse as their kind fall back to strings so that
/// nothing is lost on export.
fn typed(kind: FieldKind, value: &str) -> Value {
    match kind {
        FieldKind::Integer => value
            .parse::<i64>()
            .map_or_else(|_| Value::String(value.to_string()), Value::from),
        FieldKind::Decimal => value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(value.to_string()), Value::Number),
        FieldKind::Boolean => {
            parse_bool(value).map_or_else(|| Value::String(value.to_string()), Value::Bool)
        },
        _ => Value::String(value.to_string()),
    }
}

/// Serializes a record in profile column order.
struct JsonItem<'a> {
    profile: &'a ResolvedProfile,
    record: &'a ExchangeRecord,
}

struct JsonFields<'a> {
    fields: &'a [FieldDescriptor],
    record: &'a ExchangeRecord,
}

impl Serialize for JsonFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in self.fields {
            let value = self
                .record
                .get(&field.name)
                .map_or(Value::Null, |v| typed(field.kind, v));
            map.serialize_entry(&field.name, &value)?;
        }
        map.end()
    }
}

impl Serialize for JsonItem<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let profile = &self.profile.profile;
        let mut map = serializer.serialize_map(None)?;
        for field in profile.fields() {
            let value = self
                .record
                .get(&field.name)
                .map_or(Value::Null, |v| typed(field.kind, v));
            map.serialize_entry(&field.name, &value)?;
        }
        for collection in profile.collections() {
            let items: Vec<JsonFields<'_>> = self
                .record
                .collection(&collection.name)
                .unwrap_or_default()
                .iter()
                .map(|record| JsonFields {
                    fields: &collection.fields,
                    record,
                })
                .collect();
            map.serialize_entry(&collection.name, &items)?;
        }
        if !self.record.translations.is_empty() {
            let mut by_culture: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
            for t in &self.record.translations {
                by_culture
                    .entry(t.culture.as_str())
                    .or_default()
                    .insert(t.field.as_str(), t.value.as_str());
            }
            map.serialize_entry(TRANSLATIONS_KEY, &by_culture)?;
        }
        map.end()
    }
}

/// JSON record sink.
///
/// Writes `{"items":[...]}` with one item per line.
pub struct JsonRecordSink<W: Write> {
    writer: W,
    profile: ResolvedProfile,
    count: usize,
}

impl<W: Write> JsonRecordSink<W> {
    /// Creates a new JSON sink.
    #[must_use]
    pub const fn new(writer: W, profile: ResolvedProfile) -> Self {
        Self {
            writer,
            profile,
            count: 0,
        }
    }
}

impl<W: Write + Send> RecordSink for JsonRecordSink<W> {
    fn write(&mut self, record: &ExchangeRecord) -> Result<()> {
        let separator: &[u8] = if self.count == 0 { b"{\"items\":[\n" } else { b",\n" };
        self.writer
            .write_all(separator)
            .map_err(|e| Error::operation("write_json", e))?;
        serde_json::to_writer(
            &mut self.writer,
            &JsonItem {
                profile: &self.profile,
                record,
            },
        )
        .map_err(|e| Error::operation("serialize_json", e))?;
        self.count += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        let footer: &[u8] = if self.count == 0 { b"{\"items\":[]}\n" } else { b"\n]}\n" };
        self.writer
            .write_all(footer)
            .map_err(|e| Error::operation("write_json", e))?;
        self.writer
            .flush()
            .map_err(|e| Error::operation("flush_json", e))?;
        Ok(())
    }
}
