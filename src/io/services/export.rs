//! Record export service.
//!
//! Builds a deterministic query from an [`ExchangeContext`] and streams the
//! matching records into a format sink.

use crate::io::formats::{Format, create_record_sink};
use crate::io::traits::RecordSink;
use crate::models::{ExchangeContext, ExchangeRecord, OrderKey, RecordQuery};
use crate::schema::{ExchangeProfile, ProfileRegistry, ResolvedProfile};
use crate::storage::ExchangeStore;
use crate::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Options for a record export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Profile to export.
    pub profile: String,
    /// Payload format.
    pub format: Format,
    /// Filters, sort and window.
    pub context: ExchangeContext,
}

impl ExportOptions {
    /// Creates export options for a profile and format.
    #[must_use]
    pub fn new(profile: impl Into<String>, format: Format) -> Self {
        Self {
            profile: profile.into(),
            format,
            context: ExchangeContext::default(),
        }
    }

    /// Sets the exchange context.
    #[must_use]
    pub fn with_context(mut self, context: ExchangeContext) -> Self {
        self.context = context;
        self
    }
}

/// Result of an export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportResult {
    /// Number of records exported.
    pub exported: usize,
    /// Format used.
    pub format: Format,
}

/// Service for exporting records.
pub struct ExportService {
    registry: Arc<ProfileRegistry>,
}

impl ExportService {
    /// Creates a new export service.
    #[must_use]
    pub const fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self { registry }
    }

    /// Exports records to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is unknown, the store fails or the
    /// writer fails.
    pub async fn export_to_writer<W: Write + Send>(
        &self,
        writer: W,
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        let profile = self.registry.get_profile(&options.profile, options.format)?;
        let store = self.registry.store(&options.profile)?;
        let sink = create_record_sink(writer, &profile);
        let exported = Self::export_records(sink, &profile, store.as_ref(), &options.context).await?;
        Ok(ExportResult {
            exported,
            format: options.format,
        })
    }

    /// Streams the records selected by `context` into a sink and finalizes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the sink fails.
    pub async fn export_records(
        mut sink: Box<dyn RecordSink + '_>,
        profile: &ResolvedProfile,
        store: &dyn ExchangeStore,
        context: &ExchangeContext,
    ) -> Result<usize> {
        let query = build_query(&profile.profile, context);
        let culture = context
            .language
            .as_deref()
            .and_then(|l| profile.localization.resolve(l))
            .filter(|c| *c != profile.localization.default_culture())
            .map(str::to_string);

        let mut exported = 0;
        let mut records = store.query(&query);
        while let Some(record) = records.next().await {
            let mut record = record?;
            if let Some(culture) = &culture {
                keep_culture(&mut record, culture);
            }
            sink.write(&record)?;
            exported += 1;
        }
        drop(records);
        sink.finalize()?;

        metrics::counter!("dataport_export_records_total", "format" => profile.format.as_str())
            .increment(exported as u64);
        info!(
            profile = profile.profile.name(),
            format = %profile.format,
            exported,
            "Export finished"
        );
        Ok(exported)
    }
}

/// Builds the storage query for an export.
///
/// Filters come from the tenant, status and any parameter naming a profile
/// field. The optional `order_by` (`-` prefix for descending) sorts first;
/// creation time and natural key always break ties.
#[must_use]
pub fn build_query(profile: &ExchangeProfile, context: &ExchangeContext) -> RecordQuery {
    let mut query = RecordQuery::new();

    if let (Some(field), Some(tenant)) = (profile.tenant_field(), non_blank(&context.tenant)) {
        query = query.filter(field, tenant);
    }
    if let (Some(field), Some(status)) = (profile.status_field(), non_blank(&context.status)) {
        query = query.filter(field, status);
    }
    for (name, value) in &context.parameters {
        match profile.field_ignore_case(name) {
            Some(field) if !value.trim().is_empty() => {
                query = query.filter(field.name.clone(), value.trim());
            },
            _ => debug!(parameter = %name, "Ignoring export parameter"),
        }
    }

    if let Some(text) = context.search_text() {
        let fields = profile.searchable_fields();
        if !fields.is_empty() {
            query = query.search(text, fields);
        }
    }

    if let Some(order_by) = non_blank(&context.order_by) {
        let (name, descending) = order_by
            .strip_prefix('-')
            .map_or((order_by, false), |n| (n, true));
        match profile.field_ignore_case(name) {
            Some(field) => {
                query = query.order_by(OrderKey::Field {
                    name: field.name.clone(),
                    descending,
                });
            },
            None => debug!(order_by, "Ignoring unknown sort field"),
        }
    }

    query
        .order_by(OrderKey::CreatedAt)
        .order_by(OrderKey::NaturalKey)
        .window(context.paging)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Drops translations for every culture except `culture`, recursively.
fn keep_culture(record: &mut ExchangeRecord, culture: &str) {
    record
        .translations
        .retain(|t| t.culture.eq_ignore_ascii_case(culture));
    for items in record.collections.values_mut() {
        for item in items {
            keep_culture(item, culture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldFilter, Paging};
    use crate::schema::FieldDescriptor;

    fn profile() -> ExchangeProfile {
        ExchangeProfile::builder("customers")
            .key_field("userId")
            .tenant_field("storefrontId")
            .status_field("accountStatus")
            .field(FieldDescriptor::uuid("storefrontId"))
            .field(FieldDescriptor::text("userId").searchable())
            .field(FieldDescriptor::text("firstName").searchable())
            .field(FieldDescriptor::text("accountStatus"))
            .field(FieldDescriptor::integer("totalOrdersCount"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_context_orders_deterministically() {
        let query = build_query(&profile(), &ExchangeContext::default());
        assert!(query.filters.is_empty());
        assert!(query.search.is_none());
        assert_eq!(query.order, vec![OrderKey::CreatedAt, OrderKey::NaturalKey]);
        assert!(query.window.is_none());
    }

    #[test]
    fn test_context_becomes_filters() {
        let context = ExchangeContext::new()
            .with_tenant("s-1")
            .with_status("Blocked")
            .with_parameter("FIRSTNAME", "Ann")
            .with_parameter("unknown", "x")
            .with_search("  ann ")
            .with_order_by("-totalOrdersCount")
            .with_paging(Paging::page(2, 10));

        let query = build_query(&profile(), &context);

        assert_eq!(
            query.filters,
            vec![
                FieldFilter::new("storefrontId", "s-1"),
                FieldFilter::new("accountStatus", "Blocked"),
                FieldFilter::new("firstName", "Ann"),
            ]
        );
        let search = query.search.unwrap();
        assert_eq!(search.text, "ann");
        assert_eq!(search.fields, vec!["userId", "firstName"]);
        assert_eq!(
            query.order[0],
            OrderKey::Field {
                name: "totalOrdersCount".to_string(),
                descending: true
            }
        );
        assert_eq!(query.order.len(), 3);
        assert_eq!(query.window, Some(Paging::new(10, 10)));
    }

    #[test]
    fn test_unknown_sort_field_ignored() {
        let query = build_query(
            &profile(),
            &ExchangeContext::new().with_order_by("nickname"),
        );
        assert_eq!(query.order, vec![OrderKey::CreatedAt, OrderKey::NaturalKey]);
    }
}
