//! Exchange store trait.

use crate::Result;
use crate::models::{ExchangeRecord, RecordId, RecordQuery};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Lazy sequence of records produced by [`ExchangeStore::query`].
pub type RecordStream<'a> = Pin<Box<dyn Stream<Item = Result<ExchangeRecord>> + Send + 'a>>;

/// Storage collaborator for one record type.
///
/// Records cross this boundary in exchange shape; the store maps them to and
/// from its own representation. Every call is tenant-scoped where the record
/// type has a tenant.
///
/// Returning [`Error::InvalidInput`](crate::Error::InvalidInput) from
/// [`create`](Self::create) or [`update`](Self::update) rejects that one row;
/// any other error aborts the batch.
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Finds a record by natural key (compared case-insensitively).
    async fn find_by_natural_key(&self, tenant: Option<&str>, key: &str)
    -> Result<Option<RecordId>>;

    /// Creates a record from the present fields and returns its ID.
    ///
    /// Collections on `record` are ignored; the import pipeline adds them
    /// through [`add_collection_items`](Self::add_collection_items).
    async fn create(&self, tenant: Option<&str>, key: &str, record: &ExchangeRecord)
    -> Result<RecordId>;

    /// Applies the present fields of `record` to an existing record.
    ///
    /// Returns `false` if the record no longer exists.
    async fn update(&self, id: &RecordId, record: &ExchangeRecord) -> Result<bool>;

    /// Removes every item of a child collection.
    async fn clear_collection(&self, id: &RecordId, collection: &str) -> Result<()>;

    /// Appends items to a child collection.
    async fn add_collection_items(
        &self,
        id: &RecordId,
        collection: &str,
        items: &[ExchangeRecord],
    ) -> Result<()>;

    /// Streams records matching the query, in query order, with collections
    /// populated.
    fn query(&self, query: &RecordQuery) -> RecordStream<'_>;
}
