//! Per-call export parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A skip/take result window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Records to skip.
    pub skip: usize,
    /// Maximum records to return.
    pub take: usize,
}

impl Paging {
    /// Creates a window from skip/take.
    #[must_use]
    pub const fn new(skip: usize, take: usize) -> Self {
        Self { skip, take }
    }

    /// Creates a window from a 1-based page number and page size.
    ///
    /// Page 0 is treated as page 1.
    #[must_use]
    pub const fn page(page: usize, size: usize) -> Self {
        let page = if page == 0 { 1 } else { page };
        Self {
            skip: (page - 1).saturating_mul(size),
            take: size,
        }
    }
}

/// Transport-supplied parameters for an export.
///
/// Built per call and read-only to the export pipeline. No paging means the
/// whole result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeContext {
    /// Tenant scope.
    pub tenant: Option<String>,
    /// Free-text search over the profile's searchable fields.
    pub search: Option<String>,
    /// Status filter, applied to the profile's status field.
    pub status: Option<String>,
    /// Sort field export name; a leading `-` sorts descending.
    pub order_by: Option<String>,
    /// Result window.
    pub paging: Option<Paging>,
    /// Requested culture for localized values.
    pub language: Option<String>,
    /// Extra parameters; those naming a profile field become equality filters.
    pub parameters: BTreeMap<String, String>,
}

impl ExchangeContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tenant scope.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Sets the search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Sets the status filter.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the sort field.
    #[must_use]
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Sets the result window.
    #[must_use]
    pub const fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    /// Sets the requested culture.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the search text if it is non-blank.
    #[must_use]
    pub fn search_text(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_page() {
        assert_eq!(Paging::page(1, 20), Paging::new(0, 20));
        assert_eq!(Paging::page(3, 20), Paging::new(40, 20));
        assert_eq!(Paging::page(0, 10), Paging::new(0, 10));
    }

    #[test]
    fn test_search_text_blank() {
        assert_eq!(ExchangeContext::new().with_search("   ").search_text(), None);
        assert_eq!(
            ExchangeContext::new().with_search(" ann ").search_text(),
            Some("ann")
        );
    }
}
