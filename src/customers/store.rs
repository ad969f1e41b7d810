//! In-memory customer store.
//!
//! Implements [`ExchangeStore`] over a `RwLock`ed list of aggregates, with
//! optional JSON snapshot persistence so the CLI can keep state between runs.

use super::entity::{CustomerAddress, CustomerProfile, WishlistItem};
use crate::models::{ExchangeRecord, QueryCandidate, RecordId, RecordQuery};
use crate::storage::{ExchangeStore, RecordStream};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};
use uuid::Uuid;

const ADDRESSES: &str = "addresses";
const WISHLIST_ITEMS: &str = "wishlistItems";

/// Serializable snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    customers: Vec<CustomerProfile>,
}

/// Customer store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<Vec<CustomerProfile>>,
}

impl InMemoryCustomerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a JSON snapshot. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No customer snapshot, starting empty");
            return Ok(Self::new());
        }
        let data = fs::read(path).map_err(|e| Error::operation("read_snapshot", e))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&data).map_err(|e| Error::operation("parse_snapshot", e))?;
        debug!(
            path = %path.display(),
            customers = snapshot.customers.len(),
            "Loaded customer snapshot"
        );
        Ok(Self {
            customers: RwLock::new(snapshot.customers),
        })
    }

    /// Writes the store to a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            customers: self.customers(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::operation("serialize_snapshot", e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::operation("create_snapshot_dir", e))?;
        }
        fs::write(path, json).map_err(|e| Error::operation("write_snapshot", e))
    }

    /// Adds a customer directly.
    pub fn insert(&self, customer: CustomerProfile) {
        self.write().push(customer);
    }

    /// Returns a copy of every customer.
    #[must_use]
    pub fn customers(&self) -> Vec<CustomerProfile> {
        self.read().clone()
    }

    /// Finds a customer by user id, ignoring case.
    #[must_use]
    pub fn find(&self, user_id: &str) -> Option<CustomerProfile> {
        self.read()
            .iter()
            .find(|c| c.user_id.eq_ignore_ascii_case(user_id))
            .cloned()
    }

    /// Number of customers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<CustomerProfile>> {
        self.customers.read().unwrap_or_else(|poisoned| {
            warn!("Customer store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<CustomerProfile>> {
        self.customers.write().unwrap_or_else(|poisoned| {
            warn!("Customer store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Picks the supplied id when it is a free UUID, else a fresh one.
fn reuse_id(supplied: Option<&str>, taken: &HashSet<Uuid>) -> Uuid {
    supplied
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
        .filter(|id| !id.is_nil() && !taken.contains(id))
        .unwrap_or_else(Uuid::now_v7)
}

fn parse_id(id: &RecordId) -> Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| Error::InvalidInput(format!("'{id}' is not a customer id")))
}

#[async_trait]
impl ExchangeStore for InMemoryCustomerStore {
    async fn find_by_natural_key(
        &self,
        tenant: Option<&str>,
        key: &str,
    ) -> Result<Option<RecordId>> {
        Ok(self
            .read()
            .iter()
            .find(|c| {
                c.user_id.eq_ignore_ascii_case(key)
                    && tenant.is_none_or(|t| c.storefront_id.to_string().eq_ignore_ascii_case(t))
            })
            .map(|c| RecordId::new(c.id.to_string())))
    }

    async fn create(
        &self,
        tenant: Option<&str>,
        key: &str,
        record: &ExchangeRecord,
    ) -> Result<RecordId> {
        let mut customers = self.write();
        let taken: HashSet<Uuid> = customers.iter().map(|c| c.id).collect();
        let id = reuse_id(record.get("id"), &taken);
        let customer =
            CustomerProfile::from_exchange(id, tenant, key, record).map_err(Error::InvalidInput)?;
        customers.push(customer);
        Ok(RecordId::new(id.to_string()))
    }

    async fn update(&self, id: &RecordId, record: &ExchangeRecord) -> Result<bool> {
        let id = parse_id(id)?;
        let mut customers = self.write();
        let Some(customer) = customers.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        customer.apply(record).map_err(Error::InvalidInput)?;
        Ok(true)
    }

    async fn clear_collection(&self, id: &RecordId, collection: &str) -> Result<()> {
        let id = parse_id(id)?;
        let mut customers = self.write();
        let customer = customers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::InvalidInput(format!("customer '{id}' does not exist")))?;
        match collection {
            ADDRESSES => customer.addresses.clear(),
            WISHLIST_ITEMS => customer.wishlist_items.clear(),
            other => {
                return Err(Error::InvalidInput(format!("unknown collection '{other}'")));
            },
        }
        Ok(())
    }

    async fn add_collection_items(
        &self,
        id: &RecordId,
        collection: &str,
        items: &[ExchangeRecord],
    ) -> Result<()> {
        let id = parse_id(id)?;
        let mut customers = self.write();
        let mut taken: HashSet<Uuid> = customers
            .iter()
            .flat_map(|c| {
                c.addresses
                    .iter()
                    .map(|a| a.id)
                    .chain(c.wishlist_items.iter().map(|w| w.id))
            })
            .collect();
        let customer = customers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::InvalidInput(format!("customer '{id}' does not exist")))?;

        match collection {
            ADDRESSES => {
                let mut added = Vec::with_capacity(items.len());
                for item in items {
                    let item_id = reuse_id(item.get("id"), &taken);
                    taken.insert(item_id);
                    added.push(
                        CustomerAddress::from_exchange(item_id, item)
                            .map_err(Error::InvalidInput)?,
                    );
                }
                customer.addresses.extend(added);
            },
            WISHLIST_ITEMS => {
                let mut added = Vec::with_capacity(items.len());
                for item in items {
                    let item_id = reuse_id(item.get("id"), &taken);
                    taken.insert(item_id);
                    added.push(
                        WishlistItem::from_exchange(item_id, item).map_err(Error::InvalidInput)?,
                    );
                }
                customer.wishlist_items.extend(added);
            },
            other => {
                return Err(Error::InvalidInput(format!("unknown collection '{other}'")));
            },
        }
        Ok(())
    }

    fn query(&self, query: &RecordQuery) -> RecordStream<'_> {
        let candidates: Vec<QueryCandidate> = self
            .read()
            .iter()
            .map(|c| QueryCandidate {
                created_at: c.created_at,
                natural_key: c.user_id.clone(),
                record: c.to_exchange(),
            })
            .collect();
        let records = query.execute(candidates);
        Box::pin(futures::stream::iter(records.into_iter().map(Ok)))
    }
}
