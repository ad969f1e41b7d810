//! Profile registry.

use super::profile::ExchangeProfile;
use crate::io::Format;
use crate::storage::ExchangeStore;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Culture codes the codecs emit and accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localization {
    cultures: Vec<String>,
    default_culture: String,
}

impl Default for Localization {
    fn default() -> Self {
        Self {
            cultures: vec!["en".to_string()],
            default_culture: "en".to_string(),
        }
    }
}

impl Localization {
    /// Creates a localization setting.
    ///
    /// The default culture is `default` if it is one of `cultures`, otherwise
    /// the first culture, otherwise `en`.
    #[must_use]
    pub fn new<I, S>(cultures: I, default: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for culture in cultures {
            let culture = culture.into().trim().to_string();
            if !culture.is_empty() && !list.iter().any(|c| c.eq_ignore_ascii_case(&culture)) {
                list.push(culture);
            }
        }
        let default_culture = list
            .iter()
            .find(|c| c.eq_ignore_ascii_case(default))
            .or_else(|| list.first())
            .cloned()
            .unwrap_or_else(|| "en".to_string());
        if list.is_empty() {
            list.push(default_culture.clone());
        }
        Self {
            cultures: list,
            default_culture,
        }
    }

    /// All cultures.
    #[must_use]
    pub fn cultures(&self) -> &[String] {
        &self.cultures
    }

    /// The culture stored in the plain field value.
    #[must_use]
    pub fn default_culture(&self) -> &str {
        &self.default_culture
    }

    /// Cultures that get their own translation columns.
    pub fn extra_cultures(&self) -> impl Iterator<Item = &str> {
        self.cultures
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(&self.default_culture))
            .map(String::as_str)
    }

    /// Returns the canonical spelling of a known culture.
    #[must_use]
    pub fn resolve(&self, culture: &str) -> Option<&str> {
        self.cultures
            .iter()
            .find(|c| c.eq_ignore_ascii_case(culture))
            .map(String::as_str)
    }
}

/// A profile resolved for one format.
///
/// This is what codecs work against: the profile plus the culture columns the
/// format carries.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    /// The profile.
    pub profile: Arc<ExchangeProfile>,
    /// The format being read or written.
    pub format: Format,
    /// Culture settings.
    pub localization: Localization,
}

impl ResolvedProfile {
    /// Creates a resolved profile.
    #[must_use]
    pub const fn new(profile: Arc<ExchangeProfile>, format: Format, localization: Localization) -> Self {
        Self {
            profile,
            format,
            localization,
        }
    }

    /// Column name for a translation in tabular formats.
    #[must_use]
    pub fn translation_column(field: &str, culture: &str) -> String {
        format!("{field}:{culture}")
    }

    /// Header columns for tabular formats: field names, then one
    /// `<field>:<culture>` column per localized field and extra culture.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.profile.field_names().map(String::from).collect();
        for field in self.profile.localized_fields() {
            for culture in self.localization.extra_cultures() {
                columns.push(Self::translation_column(&field.name, culture));
            }
        }
        columns
    }

    /// Splits a `<field>:<culture>` column into its known parts.
    #[must_use]
    pub fn parse_translation_column(&self, column: &str) -> Option<(String, String)> {
        let (field, culture) = column.rsplit_once(':')?;
        let field = self.profile.field_ignore_case(field.trim())?;
        if !field.localized {
            return None;
        }
        let culture = self.localization.resolve(culture.trim())?;
        Some((field.name.clone(), culture.to_string()))
    }
}

/// A profile and the store its records live in.
#[derive(Clone)]
pub struct RegisteredProfile {
    /// The profile.
    pub profile: Arc<ExchangeProfile>,
    /// Storage collaborator for the profile's record type.
    pub store: Arc<dyn ExchangeStore>,
}

impl fmt::Debug for RegisteredProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProfile")
            .field("profile", &self.profile.name())
            .finish_non_exhaustive()
    }
}

/// Read-only catalogue of exchange profiles.
///
/// Populated at startup and shared across calls behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, RegisteredProfile>,
    localization: Localization,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(localization: Localization) -> Self {
        Self {
            profiles: BTreeMap::new(),
            localization,
        }
    }

    /// Registers a profile with its store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a profile with the same name
    /// (ignoring case) is already registered.
    pub fn register(
        &mut self,
        profile: ExchangeProfile,
        store: Arc<dyn ExchangeStore>,
    ) -> Result<()> {
        let key = profile.name().to_lowercase();
        if self.profiles.contains_key(&key) {
            return Err(Error::InvalidInput(format!(
                "profile '{}' is already registered",
                profile.name()
            )));
        }
        debug!(
            profile = profile.name(),
            fields = profile.fields().len(),
            collections = profile.collections().len(),
            "Registered exchange profile"
        );
        self.profiles.insert(
            key,
            RegisteredProfile {
                profile: Arc::new(profile),
                store,
            },
        );
        Ok(())
    }

    /// Registered profile names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.profiles.values().map(|p| p.profile.name()).collect()
    }

    /// Culture settings.
    #[must_use]
    pub const fn localization(&self) -> &Localization {
        &self.localization
    }

    /// Looks up a profile and its store, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] for an unknown name.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredProfile> {
        self.profiles
            .get(&name.trim().to_lowercase())
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
    }

    /// Resolves a profile for a format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] for an unknown name.
    pub fn get_profile(&self, name: &str, format: Format) -> Result<ResolvedProfile> {
        let registered = self.lookup(name)?;
        Ok(ResolvedProfile::new(
            Arc::clone(&registered.profile),
            format,
            self.localization.clone(),
        ))
    }

    /// Returns the store for a profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileNotFound`] for an unknown name.
    pub fn store(&self, name: &str) -> Result<Arc<dyn ExchangeStore>> {
        self.lookup(name).map(|r| Arc::clone(&r.store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::InMemoryCustomerStore;
    use crate::schema::FieldDescriptor;

    fn profile() -> ExchangeProfile {
        ExchangeProfile::builder("Products")
            .key_field("sku")
            .field(FieldDescriptor::text("sku"))
            .field(FieldDescriptor::text("title").localized())
            .build()
            .unwrap()
    }

    fn registry() -> ProfileRegistry {
        let mut registry = ProfileRegistry::new(Localization::new(["en", "ru", "de"], "en"));
        registry
            .register(profile(), Arc::new(InMemoryCustomerStore::new()))
            .unwrap();
        registry
    }

    #[test]
    fn test_lookup_ignores_case() {
        let registry = registry();
        let resolved = registry.get_profile("products", Format::Csv).unwrap();
        assert_eq!(resolved.profile.name(), "Products");
        assert_eq!(registry.names(), vec!["Products"]);
    }

    #[test]
    fn test_unknown_profile() {
        let err = registry().get_profile("orders", Format::Json).unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(name) if name == "orders"));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry();
        let err = registry
            .register(profile(), Arc::new(InMemoryCustomerStore::new()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_translation_columns() {
        let resolved = registry().get_profile("products", Format::Csv).unwrap();
        assert_eq!(
            resolved.columns(),
            vec!["sku", "title", "title:ru", "title:de"]
        );
        assert_eq!(
            resolved.parse_translation_column("Title:RU"),
            Some(("title".to_string(), "ru".to_string()))
        );
        assert_eq!(resolved.parse_translation_column("sku:ru"), None);
        assert_eq!(resolved.parse_translation_column("title:fr"), None);
    }

    #[test]
    fn test_localization_default_resolution() {
        assert_eq!(Localization::new(["ru", "en"], "EN").default_culture(), "en");
        assert_eq!(Localization::new(["ru", "de"], "en").default_culture(), "ru");
        let empty = Localization::new(Vec::<String>::new(), "fr");
        assert_eq!(empty.default_culture(), "en");
        assert_eq!(empty.cultures(), ["en".to_string()]);
    }
}
