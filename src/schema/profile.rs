//! Exchange profiles.

use super::field::{CollectionDescriptor, FieldDescriptor};
use crate::models::ExchangeRecord;
use crate::{Error, Result};
use std::collections::HashSet;

/// Separator between parts of a composite natural key.
pub const KEY_SEPARATOR: &str = "|";

/// How a row's stable identity is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalKey {
    /// One field's trimmed value.
    Field(String),
    /// Several fields' trimmed values joined with [`KEY_SEPARATOR`].
    Composite(Vec<String>),
}

impl NaturalKey {
    /// Returns the fields the key is built from.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Field(name) => vec![name.as_str()],
            Self::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Returns the label used in row errors.
    #[must_use]
    pub fn label(&self) -> String {
        self.fields().join("+")
    }

    /// Extracts the key from a record.
    ///
    /// Returns `None` when any part is absent or blank.
    #[must_use]
    pub fn extract(&self, record: &ExchangeRecord) -> Option<String> {
        let parts: Option<Vec<&str>> = self
            .fields()
            .into_iter()
            .map(|f| record.get(f).map(str::trim).filter(|v| !v.is_empty()))
            .collect();
        parts.map(|p| p.join(KEY_SEPARATOR))
    }
}

/// Immutable description of one record type's exchange shape.
///
/// Built once at startup with [`ExchangeProfile::builder`] and shared
/// read-only across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeProfile {
    name: String,
    fields: Vec<FieldDescriptor>,
    key: NaturalKey,
    tenant_field: Option<String>,
    status_field: Option<String>,
    collections: Vec<CollectionDescriptor>,
}

impl ExchangeProfile {
    /// Starts a profile definition.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ExchangeProfileBuilder {
        ExchangeProfileBuilder {
            name: name.into(),
            fields: Vec::new(),
            key: None,
            tenant_field: None,
            status_field: None,
            collections: Vec::new(),
        }
    }

    /// Profile name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration (column) order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Looks up a field by export name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field ignoring ASCII case.
    #[must_use]
    pub fn field_ignore_case(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The natural key.
    #[must_use]
    pub const fn key(&self) -> &NaturalKey {
        &self.key
    }

    /// Field holding the tenant identifier, if the record type is tenant-scoped.
    #[must_use]
    pub fn tenant_field(&self) -> Option<&str> {
        self.tenant_field.as_deref()
    }

    /// Field used by the export status filter.
    #[must_use]
    pub fn status_field(&self) -> Option<&str> {
        self.status_field.as_deref()
    }

    /// Nested collections.
    #[must_use]
    pub fn collections(&self) -> &[CollectionDescriptor] {
        &self.collections
    }

    /// Looks up a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Fields included in free-text search.
    #[must_use]
    pub fn searchable_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.searchable)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Fields that carry translations.
    pub fn localized_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.localized)
    }

    /// Extracts the natural key from a record.
    #[must_use]
    pub fn natural_key(&self, record: &ExchangeRecord) -> Option<String> {
        self.key.extract(record)
    }
}

/// Builder for [`ExchangeProfile`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ExchangeProfileBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    key: Option<NaturalKey>,
    tenant_field: Option<String>,
    status_field: Option<String>,
    collections: Vec<CollectionDescriptor>,
}

impl ExchangeProfileBuilder {
    /// Adds a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Uses one field as the natural key.
    pub fn key_field(mut self, name: impl Into<String>) -> Self {
        self.key = Some(NaturalKey::Field(name.into()));
        self
    }

    /// Uses several fields as a composite natural key.
    pub fn composite_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = Some(NaturalKey::Composite(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Names the tenant field.
    pub fn tenant_field(mut self, name: impl Into<String>) -> Self {
        self.tenant_field = Some(name.into());
        self
    }

    /// Names the status field.
    pub fn status_field(mut self, name: impl Into<String>) -> Self {
        self.status_field = Some(name.into());
        self
    }

    /// Adds a nested collection.
    pub fn collection(mut self, collection: CollectionDescriptor) -> Self {
        self.collections.push(collection);
        self
    }

    /// Validates and builds the profile.
    ///
    /// Key fields become required. Empty label keys default to
    /// `<profile>.<field>` (`<profile>.<collection>.<field>` for items), and an
    /// empty collection parent link defaults to `parentKey`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is blank, no key is set, a
    /// key/tenant/status field is not declared, or names collide.
    pub fn build(self) -> Result<ExchangeProfile> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("profile name is empty".to_string()));
        }
        let key = self
            .key
            .ok_or_else(|| Error::InvalidInput(format!("profile '{name}' has no natural key")))?;
        if key.fields().is_empty() {
            return Err(Error::InvalidInput(format!(
                "profile '{name}' has an empty composite key"
            )));
        }

        let mut fields = self.fields;
        ensure_unique(&name, fields.iter().map(|f| f.name.as_str()))?;
        let key_fields: Vec<String> = key.fields().into_iter().map(String::from).collect();
        for field in &mut fields {
            if field.label_key.is_empty() {
                field.label_key = format!("{name}.{}", field.name);
            }
            if key_fields.contains(&field.name) {
                field.required = true;
            }
        }

        let declared = |f: &str| fields.iter().any(|d| d.name == f);
        for f in key_fields
            .iter()
            .chain(self.tenant_field.iter())
            .chain(self.status_field.iter())
        {
            if !declared(f) {
                return Err(Error::InvalidInput(format!(
                    "profile '{name}' references undeclared field '{f}'"
                )));
            }
        }

        let mut collections = self.collections;
        ensure_unique(
            &name,
            fields
                .iter()
                .map(|f| f.name.as_str())
                .chain(collections.iter().map(|c| c.name.as_str())),
        )?;
        for collection in &mut collections {
            if collection.parent_link.is_empty() {
                collection.parent_link = "parentKey".to_string();
            }
            ensure_unique(
                &format!("{name}.{}", collection.name),
                collection
                    .fields
                    .iter()
                    .map(|f| f.name.as_str())
                    .chain(std::iter::once(collection.parent_link.as_str()))
                    .chain(self.tenant_field.as_deref()),
            )?;
            for field in &mut collection.fields {
                if field.label_key.is_empty() {
                    field.label_key = format!("{name}.{}.{}", collection.name, field.name);
                }
            }
        }

        Ok(ExchangeProfile {
            name,
            fields,
            key,
            tenant_field: self.tenant_field,
            status_field: self.status_field,
            collections,
        })
    }
}

fn ensure_unique<'a>(scope: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for n in names {
        if !seen.insert(n.to_lowercase()) {
            return Err(Error::InvalidInput(format!(
                "duplicate name '{n}' in '{scope}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> ExchangeProfile {
        ExchangeProfile::builder("addresses")
            .key_field("label")
            .field(FieldDescriptor::text("label"))
            .field(FieldDescriptor::text("country").required())
            .field(FieldDescriptor::text("city").searchable())
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_defaults() {
        let profile = addresses();
        let label = profile.field("label").unwrap();
        assert!(label.required, "key field is forced required");
        assert_eq!(label.label_key, "addresses.label");
        assert_eq!(profile.searchable_fields(), vec!["city".to_string()]);
        assert_eq!(
            profile.field_names().collect::<Vec<_>>(),
            vec!["label", "country", "city"]
        );
    }

    #[test]
    fn test_build_rejects_undeclared_key() {
        let err = ExchangeProfile::builder("x")
            .key_field("missing")
            .field(FieldDescriptor::text("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = ExchangeProfile::builder("x")
            .key_field("a")
            .field(FieldDescriptor::text("a"))
            .field(FieldDescriptor::text("A"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_build_requires_key() {
        assert!(
            ExchangeProfile::builder("x")
                .field(FieldDescriptor::text("a"))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_composite_key_extract() {
        let key = NaturalKey::Composite(vec!["tenant".into(), "code".into()]);
        let record = ExchangeRecord::new().with("tenant", " t1 ").with("code", "A");
        assert_eq!(key.extract(&record), Some("t1|A".to_string()));
        assert_eq!(key.label(), "tenant+code");

        let partial = ExchangeRecord::new().with("tenant", "t1").with("code", "  ");
        assert_eq!(key.extract(&partial), None);
    }

    #[test]
    fn test_collection_defaults() {
        let profile = ExchangeProfile::builder("p")
            .key_field("k")
            .field(FieldDescriptor::text("k"))
            .collection(CollectionDescriptor::new("items").field(FieldDescriptor::text("sku")))
            .build()
            .unwrap();
        let items = profile.collection("items").unwrap();
        assert_eq!(items.parent_link, "parentKey");
        assert_eq!(items.fields[0].label_key, "p.items.sku");
    }
}
