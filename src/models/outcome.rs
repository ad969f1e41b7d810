//! Batch results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-fatal problem with one import row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number.
    pub row: usize,
    /// Export name of the offending field (empty when the whole row is bad).
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl RowError {
    /// Creates a row error.
    #[must_use]
    pub fn new(row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "row {}: {}", self.row, self.message)
        } else {
            write!(f, "row {}: {}: {}", self.row, self.field, self.message)
        }
    }
}

/// Counters and row errors for one import batch.
///
/// Returned whenever the batch ran to completion, even if some rows failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Rows seen, including rejected ones.
    pub processed: usize,
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Rows rejected without a create or update.
    pub failed: usize,
    /// Row errors in input order.
    pub errors: Vec<RowError>,
}

impl ImportOutcome {
    /// Creates an empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether every row went through cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }

    /// Returns a one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Processed {}: {} created, {} updated, {} failed, {} row errors",
            self.processed,
            self.created,
            self.updated,
            self.failed,
            self.errors.len()
        )
    }
}

/// Result of validating a payload without importing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Rows decoded.
    pub total: usize,
    /// Rows without any error.
    pub valid: usize,
    /// Problems found, in input order.
    pub errors: Vec<RowError>,
}

impl ValidationReport {
    /// Returns whether all rows are valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.total == self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_display() {
        assert_eq!(
            RowError::new(2, "firstName", "is required").to_string(),
            "row 2: firstName: is required"
        );
        assert_eq!(RowError::new(4, "", "bad row").to_string(), "row 4: bad row");
    }

    #[test]
    fn test_outcome_summary() {
        let outcome = ImportOutcome {
            processed: 3,
            created: 2,
            updated: 0,
            failed: 1,
            errors: vec![RowError::new(2, "firstName", "is required")],
        };
        assert!(!outcome.is_clean());
        assert_eq!(
            outcome.summary(),
            "Processed 3: 2 created, 0 updated, 1 failed, 1 row errors"
        );
        assert!(ImportOutcome::new().is_clean());
    }
}
