//! Storage collaborator traits.

mod exchange;

pub use exchange::{ExchangeStore, RecordStream};
