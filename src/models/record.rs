//! Exchange-shaped records and decoded rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage-internal record identifier.
///
/// Opaque to the engine; only the storage collaborator interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record ID from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A per-culture value for a localized field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    /// Culture code (e.g. `ru`).
    pub culture: String,
    /// Export name of the localized field.
    pub field: String,
    /// Translated value.
    pub value: String,
}

impl Translation {
    /// Creates a translation entry.
    #[must_use]
    pub fn new(
        culture: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            culture: culture.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

/// One record in exchange shape.
///
/// Values are keyed by field export name and kept in their textual form; the
/// profile's [`FieldKind`](crate::schema::FieldKind) says how to interpret them.
/// A key being present in `values` is the presence flag: absent fields are
/// left untouched on update.
///
/// Nested collections are keyed by collection name. A collection key that is
/// present (even with no items) means "replace this collection"; an absent key
/// means "leave it alone".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Field values keyed by export name.
    pub values: BTreeMap<String, String>,
    /// Nested collection items keyed by collection name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, Vec<Self>>,
    /// Per-culture values for localized fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<Translation>,
}

impl ExchangeRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field value.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets an optional field value; `None` leaves the field absent.
    #[must_use]
    pub fn with_opt(mut self, field: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.set(field, value);
        }
        self
    }

    /// Sets a nested collection.
    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>, items: Vec<Self>) -> Self {
        self.collections.insert(name.into(), items);
        self
    }

    /// Adds a translation.
    #[must_use]
    pub fn with_translation(mut self, translation: Translation) -> Self {
        self.translations.push(translation);
        self
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.values.insert(field.into(), value.into());
    }

    /// Returns the value of a present field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Returns whether a field is present.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Returns the items of a present collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&[Self]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    /// Returns the translation of a field for a culture.
    #[must_use]
    pub fn translation(&self, culture: &str, field: &str) -> Option<&str> {
        self.translations
            .iter()
            .find(|t| t.culture.eq_ignore_ascii_case(culture) && t.field == field)
            .map(|t| t.value.as_str())
    }
}

/// One decoded unit of import input.
///
/// Produced by a codec, consumed by the import pipeline. A row the codec could
/// not make sense of still comes through, flagged with `error`, so the batch
/// can record it and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based data row number (header rows excluded).
    pub number: usize,
    /// Decoded field values, collections and translations.
    pub record: ExchangeRecord,
    /// Parse-level error for this row, if any.
    pub error: Option<String>,
}

impl Row {
    /// Creates a successfully decoded row.
    #[must_use]
    pub const fn new(number: usize, record: ExchangeRecord) -> Self {
        Self {
            number,
            record,
            error: None,
        }
    }

    /// Creates a row that failed to decode.
    #[must_use]
    pub fn malformed(number: usize, message: impl Into<String>) -> Self {
        Self {
            number,
            record: ExchangeRecord::default(),
            error: Some(message.into()),
        }
    }

    /// Returns whether the codec flagged this row.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = ExchangeRecord::new()
            .with("label", "Home")
            .with_opt("street", None::<String>)
            .with_opt("city", Some("Riga"))
            .with_collection("tags", vec![ExchangeRecord::new().with("name", "a")])
            .with_translation(Translation::new("ru", "label", "Дом"));

        assert_eq!(record.get("label"), Some("Home"));
        assert!(!record.has("street"));
        assert_eq!(record.get("city"), Some("Riga"));
        assert_eq!(record.collection("tags").map(<[_]>::len), Some(1));
        assert!(record.collection("missing").is_none());
        assert_eq!(record.translation("RU", "label"), Some("Дом"));
    }

    #[test]
    fn test_malformed_row() {
        let row = Row::malformed(3, "bad quoting");
        assert!(row.is_malformed());
        assert_eq!(row.number, 3);
        assert!(!Row::new(1, ExchangeRecord::new()).is_malformed());
    }

    #[test]
    fn test_record_id_display() {
        let id = RecordId::from("abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(id.as_str(), "abc");
    }
}
