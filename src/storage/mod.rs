//! Storage layer abstraction.
//!
//! The engine never touches a database directly. Each registered profile is
//! paired with an [`ExchangeStore`] that resolves natural keys, creates and
//! updates records, replaces child collections and streams query results.
//! [`InMemoryCustomerStore`](crate::customers::InMemoryCustomerStore) is the
//! implementation shipped with the crate.

pub mod traits;

pub use traits::{ExchangeStore, RecordStream};
