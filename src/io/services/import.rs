//! Record import service.
//!
//! Runs decoded rows through natural-key upsert and collection replacement.

#![allow(clippy::cast_precision_loss)]

use crate::io::formats::{Format, create_row_source};
use crate::io::traits::RowSource;
use crate::io::validation::RowValidator;
use crate::models::{ExchangeRecord, ImportOutcome, RecordId, Row, RowError, ValidationReport};
use crate::schema::{ProfileRegistry, ResolvedProfile};
use crate::storage::ExchangeStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, info};

/// Options for a record import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Profile to import into.
    pub profile: String,
    /// Payload format.
    pub format: Format,
    /// Tenant scope for the batch.
    pub tenant: Option<String>,
}

impl ImportOptions {
    /// Creates import options for a profile and format.
    #[must_use]
    pub fn new(profile: impl Into<String>, format: Format) -> Self {
        Self {
            profile: profile.into(),
            format,
            tenant: None,
        }
    }

    /// Sets the tenant scope.
    #[must_use]
    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant.filter(|t| !t.trim().is_empty());
        self
    }
}

/// Progress callback for import operations.
pub type ProgressCallback = Box<dyn Fn(&ImportProgress) + Send + Sync>;

/// Progress information during import.
#[derive(Debug, Clone, Default)]
pub struct ImportProgress {
    /// Rows processed so far.
    pub processed: usize,
    /// Rows rejected so far.
    pub failed: usize,
    /// Estimated total rows (if known).
    pub total_estimate: Option<usize>,
}

impl ImportProgress {
    /// Returns the percentage complete (0-100) if total is known.
    #[must_use]
    pub fn percent_complete(&self) -> Option<f32> {
        self.total_estimate.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.processed as f32 / total as f32) * 100.0
            }
        })
    }
}

/// Why a row was rejected.
enum Rejection {
    Row(Vec<RowError>),
    Fatal(Error),
}

impl From<RowError> for Rejection {
    fn from(error: RowError) -> Self {
        Self::Row(vec![error])
    }
}

/// Service for importing records.
///
/// Each call owns its own identity cache, so concurrent batches never see
/// each other's keys.
pub struct ImportService {
    registry: Arc<ProfileRegistry>,
}

impl ImportService {
    /// Creates a new import service.
    #[must_use]
    pub const fn new(registry: Arc<ProfileRegistry>) -> Self {
        Self { registry }
    }

    /// Imports records from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is unknown, the payload is malformed
    /// at the container level, or the store fails fatally.
    pub async fn import_from_reader<R: BufRead + Send>(
        &self,
        reader: R,
        options: &ImportOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<ImportOutcome> {
        let profile = self.registry.get_profile(&options.profile, options.format)?;
        let store = self.registry.store(&options.profile)?;
        let mut source = create_row_source(reader, &profile)?;
        Self::import_rows(
            source.as_mut(),
            &profile,
            store.as_ref(),
            options.tenant.as_deref(),
            progress.as_ref(),
        )
        .await
    }

    /// Imports every row of a source into a store.
    ///
    /// Rows are processed strictly in input order. Row-level problems are
    /// collected in the outcome; only store failures other than
    /// [`Error::InvalidInput`] abort the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails at the I/O level or the store
    /// fails fatally.
    pub async fn import_rows(
        source: &mut (dyn RowSource + '_),
        profile: &ResolvedProfile,
        store: &dyn ExchangeStore,
        tenant: Option<&str>,
        progress: Option<&ProgressCallback>,
    ) -> Result<ImportOutcome> {
        let mut batch = Batch {
            profile,
            store,
            tenant,
            validator: RowValidator::new(&profile.profile),
            identities: HashMap::new(),
            outcome: ImportOutcome::new(),
        };
        let total_estimate = source.size_hint();

        while let Some(row) = source.next()? {
            batch.outcome.processed += 1;
            match batch.upsert(row).await {
                Ok(label) => record_row(label),
                Err(Rejection::Row(errors)) => {
                    batch.outcome.failed += 1;
                    batch.outcome.errors.extend(errors);
                    record_row("failed");
                },
                Err(Rejection::Fatal(e)) => return Err(e),
            }

            if let Some(callback) = progress {
                callback(&ImportProgress {
                    processed: batch.outcome.processed,
                    failed: batch.outcome.failed,
                    total_estimate,
                });
            }
        }

        let outcome = batch.outcome;
        info!(
            profile = profile.profile.name(),
            format = %profile.format,
            processed = outcome.processed,
            created = outcome.created,
            updated = outcome.updated,
            failed = outcome.failed,
            "Import batch finished"
        );
        Ok(outcome)
    }

    /// Validates records from a reader without touching storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is unknown or the payload is
    /// malformed at the container level.
    pub fn validate_from_reader<R: BufRead + Send>(
        &self,
        reader: R,
        profile: &str,
        format: Format,
    ) -> Result<ValidationReport> {
        let profile = self.registry.get_profile(profile, format)?;
        let mut source = create_row_source(reader, &profile)?;
        Self::validate_rows(source.as_mut(), &profile)
    }

    /// Validates every row of a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails at the I/O level.
    pub fn validate_rows(
        source: &mut (dyn RowSource + '_),
        profile: &ResolvedProfile,
    ) -> Result<ValidationReport> {
        let validator = RowValidator::new(&profile.profile);
        let mut report = ValidationReport::default();
        while let Some(row) = source.next()? {
            report.total += 1;
            let errors = validator.validate(&row);
            if errors.is_empty() {
                report.valid += 1;
            }
            report.errors.extend(errors);
        }
        debug!(
            profile = profile.profile.name(),
            total = report.total,
            valid = report.valid,
            "Validated import payload"
        );
        Ok(report)
    }
}

fn record_row(outcome: &'static str) {
    metrics::counter!("dataport_import_rows_total", "outcome" => outcome).increment(1);
}

/// State of one import batch.
struct Batch<'a> {
    profile: &'a ResolvedProfile,
    store: &'a dyn ExchangeStore,
    tenant: Option<&'a str>,
    validator: RowValidator<'a>,
    /// Tenant-scoped natural key to stored id, for hits and misses alike.
    identities: HashMap<IdentityKey, Option<RecordId>>,
    outcome: ImportOutcome,
}

impl Batch<'_> {
    async fn upsert(&mut self, mut row: Row) -> std::result::Result<&'static str, Rejection> {
        if let Some(error) = RowValidator::parse_error(&row) {
            return Err(error.into());
        }
        let key = self.validator.natural_key(&row)?;
        let tenant = self.scope_tenant(&mut row)?;

        let errors = self.validator.check_values(&row);
        if !errors.is_empty() {
            return Err(Rejection::Row(errors));
        }

        let (id, label) = match self.resolve(tenant.as_deref(), &key).await? {
            None => {
                let errors = self.validator.check_required(&row);
                if !errors.is_empty() {
                    return Err(Rejection::Row(errors));
                }
                let id = stored(
                    self.store.create(tenant.as_deref(), &key, &row.record).await,
                    row.number,
                )?;
                self.identities
                    .insert(identity_key(tenant.as_deref(), &key), Some(id.clone()));
                self.outcome.created += 1;
                (id, "created")
            },
            Some(id) => {
                let found = stored(self.store.update(&id, &row.record).await, row.number)?;
                if !found {
                    self.identities.remove(&identity_key(tenant.as_deref(), &key));
                    return Err(RowError::new(
                        row.number,
                        self.profile.profile.key().label(),
                        format!("record '{key}' no longer exists"),
                    )
                    .into());
                }
                self.outcome.updated += 1;
                (id, "updated")
            },
        };

        self.replace_collections(&id, &row).await?;
        Ok(label)
    }

    /// Fills or checks the row's tenant against the batch tenant.
    fn scope_tenant(&self, row: &mut Row) -> std::result::Result<Option<String>, Rejection> {
        let Some(field) = self.profile.profile.tenant_field() else {
            return Ok(self.tenant.map(str::to_string));
        };
        let own = row.record.get(field).map(str::to_string);
        match (self.tenant, own) {
            (Some(batch), Some(own)) if !batch.eq_ignore_ascii_case(&own) => Err(RowError::new(
                row.number,
                field,
                format!("belongs to tenant '{own}', expected '{batch}'"),
            )
            .into()),
            (Some(batch), None) => {
                row.record.set(field, batch);
                Ok(Some(batch.to_string()))
            },
            (batch, own) => Ok(own.or_else(|| batch.map(str::to_string))),
        }
    }

    async fn resolve(
        &mut self,
        tenant: Option<&str>,
        key: &str,
    ) -> std::result::Result<Option<RecordId>, Rejection> {
        let cache_key = identity_key(tenant, key);
        if let Some(cached) = self.identities.get(&cache_key) {
            return Ok(cached.clone());
        }
        let found = self
            .store
            .find_by_natural_key(tenant, key)
            .await
            .map_err(Rejection::Fatal)?;
        self.identities.insert(cache_key, found.clone());
        Ok(found)
    }

    /// Clear-then-add for every collection the row carries.
    async fn replace_collections(
        &mut self,
        id: &RecordId,
        row: &Row,
    ) -> std::result::Result<(), Rejection> {
        for collection in self.profile.profile.collections() {
            let Some(items) = row.record.collection(&collection.name) else {
                continue;
            };

            let mut accepted: Vec<ExchangeRecord> = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let errors = RowValidator::check_item(collection, row.number, index, item);
                if errors.is_empty() {
                    accepted.push(item.clone());
                } else {
                    self.outcome.errors.extend(errors);
                }
            }

            let mut replaced = self.store.clear_collection(id, &collection.name).await;
            if replaced.is_ok() && !accepted.is_empty() {
                replaced = self
                    .store
                    .add_collection_items(id, &collection.name, &accepted)
                    .await;
            }
            match replaced {
                Ok(()) => {},
                Err(Error::InvalidInput(message)) => self.outcome.errors.push(RowError::new(
                    row.number,
                    collection.name.clone(),
                    message,
                )),
                Err(e) => return Err(Rejection::Fatal(e)),
            }
        }
        Ok(())
    }
}

/// Lowercased tenant and natural key.
type IdentityKey = (Option<String>, String);

fn identity_key(tenant: Option<&str>, key: &str) -> IdentityKey {
    (tenant.map(str::to_lowercase), key.to_lowercase())
}

/// Maps a store result for a single row: `InvalidInput` is row-level.
fn stored<T>(result: Result<T>, row: usize) -> std::result::Result<T, Rejection> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::InvalidInput(message)) => Err(RowError::new(row, "", message).into()),
        Err(e) => Err(Rejection::Fatal(e)),
    }
}
