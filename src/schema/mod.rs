//! Schema and profile registry.
//!
//! An [`ExchangeProfile`] says which fields of a record type take part in
//! exchange, which are required, how the natural key is formed and which
//! nested collections travel with the parent. Profiles are composed field by
//! field at startup and registered in a [`ProfileRegistry`] together with the
//! store that holds their records.
//!
//! # Example
//!
//! ```rust
//! use dataport::schema::{CollectionDescriptor, ExchangeProfile, FieldDescriptor};
//!
//! let profile = ExchangeProfile::builder("suppliers")
//!     .key_field("code")
//!     .field(FieldDescriptor::text("code"))
//!     .field(FieldDescriptor::text("name").required().searchable())
//!     .collection(
//!         CollectionDescriptor::new("contacts")
//!             .parent_link("supplierCode")
//!             .field(FieldDescriptor::text("email").required()),
//!     )
//!     .build()?;
//! assert!(profile.field("code").is_some_and(|f| f.required));
//! # Ok::<(), dataport::Error>(())
//! ```

mod field;
mod profile;
mod registry;

pub use field::{CollectionDescriptor, FieldDescriptor, FieldKind, parse_bool};
pub use profile::{ExchangeProfile, ExchangeProfileBuilder, KEY_SEPARATOR, NaturalKey};
pub use registry::{Localization, ProfileRegistry, RegisteredProfile, ResolvedProfile};
