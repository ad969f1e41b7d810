//! Core traits for the format codecs.
//!
//! Defines the [`RowSource`] and [`RecordSink`] traits that every format
//! implements. The import pipeline pulls [`Row`]s from a source; the export
//! pipeline pushes [`ExchangeRecord`]s into a sink.

use crate::Result;
use crate::models::{ExchangeRecord, Row};

/// Forward-only sequence of decoded rows.
///
/// A row the decoder could not interpret comes back as a [`Row`] with its
/// `error` set; the source keeps going. Only container-level problems are
/// returned as `Err`, and they end the sequence.
///
/// # Example Implementation
///
/// ```rust,ignore
/// impl RowSource for LineSource {
///     fn next(&mut self) -> Result<Option<Row>> {
///         let Some(line) = self.lines.next() else {
///             return Ok(None);
///         };
///         self.number += 1;
///         Ok(Some(match parse(&line) {
///             Ok(record) => Row::new(self.number, record),
///             Err(e) => Row::malformed(self.number, e),
///         }))
///     }
/// }
/// ```
pub trait RowSource: Send {
    /// Reads the next row.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or container-level corruption.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Returns an estimate of the number of rows left.
    ///
    /// Returns `None` if unknown.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Destination for encoded records.
///
/// # Lifecycle
///
/// 1. Create the sink over its output
/// 2. Call `write()` for each record, in order
/// 3. Call `finalize()` to write footers and flush
///
/// A sink that is finalized without any `write()` produces a valid, empty
/// document (headers only for tabular formats).
pub trait RecordSink: Send {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, record: &ExchangeRecord) -> Result<()>;

    /// Finishes the document and flushes the output.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// A [`RowSource`] over rows that were decoded up front.
///
/// Used by formats that must see the whole container before yielding rows.
pub struct BufferedRows {
    rows: std::vec::IntoIter<Row>,
}

impl BufferedRows {
    /// Wraps decoded rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for BufferedRows {
    fn next(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}
