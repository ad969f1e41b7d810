//! Record import/export subsystem.
//!
//! Turns payload bytes into rows and rows into stored records, and the
//! reverse for export.
//!
//! # Architecture
//!
//! - **Format adapters** implement [`RowSource`] and [`RecordSink`]
//! - **Validation layer** checks rows against the profile
//! - **Services** orchestrate decoding, validation and storage
//!
//! # Supported Formats
//!
//! | Format | Import | Export | Collections |
//! |--------|--------|--------|-------------|
//! | JSON | ✓ | ✓ | nested arrays |
//! | CSV | ✓ | ✓ | - |
//! | Excel | ✓ | ✓ | one sheet per collection |
//! | XML | ✓ | ✓ | nested elements |
//!
//! # Examples
//!
//! ```rust,ignore
//! use dataport::io::{Format, ImportOptions, ImportService};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("customers.csv")?);
//! let outcome = service
//!     .import_from_reader(file, &ImportOptions::new("customers", Format::Csv), None)
//!     .await?;
//! println!("{}", outcome.summary());
//! ```

pub mod formats;
pub mod services;
pub mod traits;
pub mod validation;

// Re-exports for convenience
pub use formats::{Format, create_record_sink, create_row_source};
pub use services::export::{ExportOptions, ExportResult, ExportService};
pub use services::import::{ImportOptions, ImportProgress, ImportService, ProgressCallback};
pub use services::template::{self, TemplatePayload};
pub use traits::{BufferedRows, RecordSink, RowSource};
pub use validation::RowValidator;
