//! Import, export and template services.
//!
//! Orchestrates format codecs, row validation and storage operations.

pub mod export;
pub mod import;
pub mod template;

pub use export::{ExportOptions, ExportResult, ExportService, build_query};
pub use import::{ImportOptions, ImportProgress, ImportService, ProgressCallback};
pub use template::TemplatePayload;
