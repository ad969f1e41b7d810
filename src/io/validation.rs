//! Row validation.
//!
//! Checks decoded rows against a profile before anything reaches storage.
//! The import pipeline runs the checks one stage at a time; the validate-only
//! path runs all of them at once via [`RowValidator::validate`].

use crate::models::{ExchangeRecord, Row, RowError};
use crate::schema::{CollectionDescriptor, ExchangeProfile, FieldDescriptor};

/// Message used for a missing required field.
pub const REQUIRED: &str = "is required";

/// Validates rows for one profile.
#[derive(Debug, Clone, Copy)]
pub struct RowValidator<'a> {
    profile: &'a ExchangeProfile,
}

impl<'a> RowValidator<'a> {
    /// Creates a validator for a profile.
    #[must_use]
    pub const fn new(profile: &'a ExchangeProfile) -> Self {
        Self { profile }
    }

    /// Returns the codec's parse error for the row, if any.
    #[must_use]
    pub fn parse_error(row: &Row) -> Option<RowError> {
        row.error
            .as_ref()
            .map(|message| RowError::new(row.number, "", message.clone()))
    }

    /// Extracts the row's natural key.
    ///
    /// # Errors
    ///
    /// Returns a row error naming the key field(s) if any part is missing.
    pub fn natural_key(&self, row: &Row) -> Result<String, RowError> {
        self.profile.natural_key(&row.record).ok_or_else(|| {
            RowError::new(row.number, self.profile.key().label(), "natural key is missing")
        })
    }

    /// Checks present top-level values against their field kinds.
    #[must_use]
    pub fn check_values(&self, row: &Row) -> Vec<RowError> {
        kind_errors(self.profile.fields(), &row.record, row.number, None)
    }

    /// Checks that every required top-level field is present.
    #[must_use]
    pub fn check_required(&self, row: &Row) -> Vec<RowError> {
        self.profile
            .fields()
            .iter()
            .filter(|f| f.required && !row.record.has(&f.name))
            .map(|f| RowError::new(row.number, f.name.clone(), REQUIRED))
            .collect()
    }

    /// Checks one collection item: required fields first, then kinds.
    ///
    /// Field names in the errors are qualified as `<collection>[<index>].<field>`.
    #[must_use]
    pub fn check_item(
        collection: &CollectionDescriptor,
        row: usize,
        index: usize,
        item: &ExchangeRecord,
    ) -> Vec<RowError> {
        let scope = format!("{}[{index}]", collection.name);
        let mut errors: Vec<RowError> = collection
            .fields
            .iter()
            .filter(|f| f.required && !item.has(&f.name))
            .map(|f| RowError::new(row, format!("{scope}.{}", f.name), REQUIRED))
            .collect();
        errors.extend(kind_errors(&collection.fields, item, row, Some(&scope)));
        errors
    }

    /// Runs every check as if the row were going to be created.
    #[must_use]
    pub fn validate(&self, row: &Row) -> Vec<RowError> {
        if let Some(error) = Self::parse_error(row) {
            return vec![error];
        }
        let mut errors = Vec::new();
        if let Err(error) = self.natural_key(row) {
            errors.push(error);
        }
        errors.extend(
            self.check_required(row)
                .into_iter()
                .filter(|e| !self.profile.key().fields().contains(&e.field.as_str())),
        );
        errors.extend(self.check_values(row));
        for collection in self.profile.collections() {
            for (index, item) in row
                .record
                .collection(&collection.name)
                .unwrap_or_default()
                .iter()
                .enumerate()
            {
                errors.extend(Self::check_item(collection, row.number, index, item));
            }
        }
        errors
    }
}

fn kind_errors(
    fields: &[FieldDescriptor],
    record: &ExchangeRecord,
    row: usize,
    scope: Option<&str>,
) -> Vec<RowError> {
    fields
        .iter()
        .filter_map(|field| {
            let value = record.get(&field.name)?;
            let message = field.kind.validate(value).err()?;
            let name = scope.map_or_else(|| field.name.clone(), |s| format!("{s}.{}", field.name));
            Some(RowError::new(row, name, message))
        })
        .collect()
}
