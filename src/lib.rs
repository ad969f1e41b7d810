//! # Dataport
//!
//! Profile-driven bulk import/export of structured records.
//!
//! A record type is described once by an [`ExchangeProfile`]: the fields that
//! participate in exchange, which of them are required, the natural key used to
//! match incoming rows against stored records, and any nested child
//! collections. Everything else (codecs, pipelines, transfer staging) is
//! driven by that description.
//!
//! ## Features
//!
//! - JSON, CSV, spreadsheet (xlsx) and XML payloads behind one codec interface
//! - Natural-key upsert with an in-batch identity cache
//! - Clear-then-add replacement of nested collections
//! - Per-row error accumulation that never aborts the batch
//! - Unary and chunked-streaming transfers with scoped temp staging and
//!   remote URL download/upload
//!
//! ## Example
//!
//! ```rust,ignore
//! use dataport::transfer::{ImportRequest, PayloadSource, TransferGateway};
//!
//! let outcome = gateway
//!     .import(ImportRequest::new("customers", "csv", PayloadSource::Inline(bytes)))
//!     .await?;
//! println!("{} processed, {} failed", outcome.processed, outcome.failed);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod customers;
pub mod io;
pub mod models;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod transfer;

// Re-exports for convenience
pub use config::DataportConfig;
pub use io::Format;
pub use models::{
    ExchangeContext, ExchangeRecord, ImportOutcome, Paging, RecordId, Row, RowError,
    ValidationReport,
};
pub use schema::{ExchangeProfile, FieldDescriptor, FieldKind, ProfileRegistry};
pub use storage::ExchangeStore;
pub use transfer::TransferGateway;

/// Error type for dataport operations.
///
/// Row-level problems (a missing required field, an unparseable value, an
/// update target that vanished) are never raised as `Error`; they are
/// collected as [`RowError`]s in the [`ImportOutcome`]. Every variant here
/// aborts the call that produced it.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad request parameters, invalid configuration, profile definition errors |
/// | `OperationFailed` | Temp file I/O, storage connectivity, encoder failures |
/// | `ProfileNotFound` | Profile name is not registered |
/// | `UnsupportedFormat` | Format identifier is not `json`, `csv`, `excel` or `xml` |
/// | `MalformedPayload` | Container-level decode failure (invalid top-level JSON, broken XML, unreadable workbook) |
/// | `MissingMetadata` | First stream chunk lacks profile or format |
/// | `AmbiguousSource` | Streaming call mixes inline bytes and a source URL |
/// | `DownloadFailed` | Remote source URL cannot be fetched |
/// | `UploadFailed` | Remote destination returned a non-2xx status |
/// | `Cancelled` | The caller went away before the call finished |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A request is missing a required parameter
    /// - A configuration value is out of range
    /// - A profile definition references an unknown field
    ///
    /// When returned by a storage collaborator for a single create or update
    /// it is treated as a row-level failure instead.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Temp staging files cannot be created, written or read
    /// - The storage collaborator loses its connection
    /// - An encoder cannot write to its destination
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The requested exchange profile is not registered.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// The format identifier is not recognized.
    #[error("unsupported format: '{0}'")]
    UnsupportedFormat(String),

    /// The payload cannot be decoded at the container level.
    ///
    /// Raised when:
    /// - The JSON document is not an object with an `items` array (or an array)
    /// - The XML document is not well formed
    /// - The spreadsheet archive or its workbook part cannot be read
    /// - The CSV header row cannot be read
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The first chunk of a streaming call did not carry profile and format.
    #[error("missing stream metadata: {0}")]
    MissingMetadata(String),

    /// A streaming call mixed inline bytes with a remote source URL.
    #[error("ambiguous source: {0}")]
    AmbiguousSource(String),

    /// A remote source URL could not be downloaded.
    #[error("download of '{url}' failed: {cause}")]
    DownloadFailed {
        /// The URL that was requested (query string stripped).
        url: String,
        /// The underlying cause.
        cause: String,
    },

    /// A remote destination rejected the upload.
    #[error("upload failed: HTTP {status}: {body}")]
    UploadFailed {
        /// HTTP status code returned by the destination (0 if none).
        status: u16,
        /// Response body, or the transport error message.
        body: String,
    },

    /// The caller cancelled the call.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Returns a stable, machine-readable identifier for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::OperationFailed { .. } => "operation_failed",
            Self::ProfileNotFound(_) => "profile_not_found",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::MissingMetadata(_) => "missing_metadata",
            Self::AmbiguousSource(_) => "ambiguous_source",
            Self::DownloadFailed { .. } => "download_failed",
            Self::UploadFailed { .. } => "upload_failed",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Shorthand for an [`Error::OperationFailed`] built from any displayable cause.
    pub fn operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for dataport operations.
pub type Result<T> = std::result::Result<T, Error>;
