//! Field and collection descriptors.

use chrono::DateTime;
use uuid::Uuid;

/// How a field's textual value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Signed 64-bit integer.
    Integer,
    /// Decimal number.
    Decimal,
    /// `true`/`false`, also accepting `1`/`0` and `yes`/`no`.
    Boolean,
    /// RFC 3339 timestamp.
    Timestamp,
    /// UUID in any standard textual form.
    Uuid,
    /// One of a closed set of values, compared case-insensitively.
    Choice(&'static [&'static str]),
}

impl FieldKind {
    /// Returns a short name for messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Choice(_) => "choice",
        }
    }

    /// Checks a value against this kind.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the value does not fit.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            Self::Text => true,
            Self::Integer => value.parse::<i64>().is_ok(),
            Self::Decimal => value.parse::<f64>().is_ok_and(f64::is_finite),
            Self::Boolean => parse_bool(value).is_some(),
            Self::Timestamp => DateTime::parse_from_rfc3339(value).is_ok(),
            Self::Uuid => Uuid::parse_str(value).is_ok(),
            Self::Choice(options) => options.iter().any(|o| o.eq_ignore_ascii_case(value)),
        };
        if ok {
            return Ok(());
        }
        Err(match self {
            Self::Choice(options) => format!(
                "'{value}' is not one of: {}",
                options.join(", ")
            ),
            _ => format!("'{value}' is not a valid {}", self.as_str()),
        })
    }
}

/// Parses the boolean spellings accepted in payloads.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// One field participating in exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Export column name.
    pub name: String,
    /// Localization key for the column label.
    ///
    /// Left empty in the builder and filled in as `<profile>.<name>` when the
    /// profile is built.
    pub label_key: String,
    /// Value kind.
    pub kind: FieldKind,
    /// Must be present when a record is created.
    pub required: bool,
    /// Included in free-text export search.
    pub searchable: bool,
    /// Carries per-culture translations.
    pub localized: bool,
}

impl FieldDescriptor {
    /// Creates an optional field.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label_key: String::new(),
            kind,
            required: false,
            searchable: false,
            localized: false,
        }
    }

    /// Creates a text field.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Creates an integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Creates a decimal field.
    #[must_use]
    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Decimal)
    }

    /// Creates a boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Creates a timestamp field.
    #[must_use]
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    /// Creates a UUID field.
    #[must_use]
    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uuid)
    }

    /// Creates a closed-set field.
    #[must_use]
    pub fn choice(name: impl Into<String>, options: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Choice(options))
    }

    /// Marks the field required on create.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Includes the field in free-text search.
    #[must_use]
    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Marks the field as carrying translations.
    #[must_use]
    pub const fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    /// Overrides the label key.
    #[must_use]
    pub fn label_key(mut self, key: impl Into<String>) -> Self {
        self.label_key = key.into();
        self
    }
}

/// A nested child collection owned by the parent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    /// Collection name (JSON key, XML element, spreadsheet sheet).
    pub name: String,
    /// Column that links a flattened child row to its parent's natural key.
    pub parent_link: String,
    /// Item fields.
    pub fields: Vec<FieldDescriptor>,
}

impl CollectionDescriptor {
    /// Creates an empty collection descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_link: String::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the parent-link column name.
    #[must_use]
    pub fn parent_link(mut self, column: impl Into<String>) -> Self {
        self.parent_link = column.into();
        self
    }

    /// Adds an item field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up an item field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns item field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
