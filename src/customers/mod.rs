//! Customer profiles.
//!
//! The record type shipped with the engine: a customer aggregate with
//! addresses and a wishlist, its `customers` exchange profile, and an
//! in-memory [`ExchangeStore`](crate::storage::ExchangeStore).
//!
//! # Example
//!
//! ```rust,ignore
//! use dataport::customers::{InMemoryCustomerStore, customer_profile};
//!
//! let store = Arc::new(InMemoryCustomerStore::load(&snapshot)?);
//! registry.register(customer_profile()?, store.clone())?;
//! ```

mod entity;
mod profile;
mod store;

pub use entity::{
    AccountState, AccountStatus, ContactVerification, CustomerAddress, CustomerProfile,
    Preferences, STATUS_NAMES, WishlistItem, format_timestamp,
};
pub use profile::{CUSTOMERS, customer_profile};
pub use store::InMemoryCustomerStore;
