//! Exchange profile for customer profiles.

use super::entity::STATUS_NAMES;
use crate::Result;
use crate::schema::{CollectionDescriptor, ExchangeProfile, FieldDescriptor};

/// Profile name used on the wire.
pub const CUSTOMERS: &str = "customers";

/// Builds the `customers` exchange profile.
///
/// Keyed by `userId` and scoped by `storefrontId`. Fields the aggregate
/// defaults on create (language, status, preferences) are optional here.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] if the definition is inconsistent.
pub fn customer_profile() -> Result<ExchangeProfile> {
    ExchangeProfile::builder(CUSTOMERS)
        .key_field("userId")
        .tenant_field("storefrontId")
        .status_field("accountStatus")
        .field(FieldDescriptor::uuid("id"))
        .field(FieldDescriptor::uuid("storefrontId").required())
        .field(FieldDescriptor::text("userId").searchable())
        .field(FieldDescriptor::text("firstName").required().searchable())
        .field(FieldDescriptor::text("lastName").searchable())
        .field(FieldDescriptor::text("username").searchable())
        .field(FieldDescriptor::text("photoUrl"))
        .field(FieldDescriptor::text("phone").searchable())
        .field(FieldDescriptor::text("email").searchable())
        .field(FieldDescriptor::text("languageCode"))
        .field(FieldDescriptor::choice("accountStatus", STATUS_NAMES))
        .field(FieldDescriptor::timestamp("blockedAt"))
        .field(FieldDescriptor::text("blockReason"))
        .field(FieldDescriptor::timestamp("suspendedUntil"))
        .field(FieldDescriptor::integer("totalOrdersCount"))
        .field(FieldDescriptor::decimal("totalSpent"))
        .field(FieldDescriptor::boolean("emailVerified"))
        .field(FieldDescriptor::boolean("phoneVerified"))
        .field(FieldDescriptor::boolean("emailNotificationsEnabled"))
        .field(FieldDescriptor::boolean("telegramNotificationsEnabled"))
        .field(FieldDescriptor::boolean("smsNotificationsEnabled"))
        .field(FieldDescriptor::boolean("orderStatusUpdates"))
        .field(FieldDescriptor::boolean("promotionalOffers"))
        .field(FieldDescriptor::text("preferredLanguage"))
        .field(FieldDescriptor::text("preferredCurrency"))
        .collection(
            CollectionDescriptor::new("addresses")
                .parent_link("userId")
                .field(FieldDescriptor::uuid("id"))
                .field(FieldDescriptor::text("label").required())
                .field(FieldDescriptor::text("country").required())
                .field(FieldDescriptor::text("city").required())
                .field(FieldDescriptor::text("street"))
                .field(FieldDescriptor::text("building"))
                .field(FieldDescriptor::text("apartment"))
                .field(FieldDescriptor::text("postalCode"))
                .field(FieldDescriptor::text("phone"))
                .field(FieldDescriptor::boolean("isDefault")),
        )
        .collection(
            CollectionDescriptor::new("wishlistItems")
                .parent_link("userId")
                .field(FieldDescriptor::uuid("productId").required())
                .field(FieldDescriptor::uuid("productSkuId"))
                .field(FieldDescriptor::timestamp("addedAt"))
                .field(FieldDescriptor::text("note")),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_profile_shape() {
        let profile = customer_profile().unwrap();
        assert_eq!(profile.name(), "customers");
        assert_eq!(profile.key().label(), "userId");
        assert_eq!(profile.tenant_field(), Some("storefrontId"));
        assert_eq!(profile.fields().len(), 25);
        assert!(profile.field("userId").unwrap().required);
        assert_eq!(
            profile.searchable_fields(),
            vec!["userId", "firstName", "lastName", "username", "phone", "email"]
        );
        let addresses = profile.collection("addresses").unwrap();
        let required: Vec<&str> = addresses
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(required, vec!["label", "country", "city"]);
        assert_eq!(addresses.fields[1].label_key, "customers.addresses.label");
    }
}
