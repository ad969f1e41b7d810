//! Data models for dataport.
//!
//! Records in exchange shape, batch results, export parameters and the
//! query description handed to stores.

mod context;
mod outcome;
mod query;
mod record;

pub use context::{ExchangeContext, Paging};
pub use outcome::{ImportOutcome, RowError, ValidationReport};
pub use query::{FieldFilter, OrderKey, QueryCandidate, RecordQuery, TextSearch};
pub use record::{ExchangeRecord, RecordId, Row, Translation};
