//! Customer profile aggregate.
//!
//! The aggregate owns three value objects ([`AccountStatus`],
//! [`ContactVerification`], [`Preferences`]) that are flattened into top-level
//! exchange fields, plus two child collections. [`CustomerProfile::apply`]
//! applies exactly the fields present in an exchange record and runs the
//! domain side effects tied to them.

use crate::models::ExchangeRecord;
use crate::schema::parse_bool;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account status values accepted by the `accountStatus` field.
pub const STATUS_NAMES: &[&str] = &["Active", "Blocked", "Suspended", "Deleted"];

/// Lifecycle state of a customer account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountState {
    /// Normal account.
    #[default]
    Active,
    /// Blocked by an operator.
    Blocked,
    /// Temporarily suspended.
    Suspended,
    /// Soft-deleted.
    Deleted,
}

impl AccountState {
    /// Returns the exchange name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Blocked => "Blocked",
            Self::Suspended => "Suspended",
            Self::Deleted => "Deleted",
        }
    }
}

impl FromStr for AccountState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("unknown account status '{s}'")),
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status and order statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStatus {
    /// Current state.
    pub state: AccountState,
    /// When the account was blocked or suspended.
    pub blocked_at: Option<DateTime<Utc>>,
    /// Reason given for the block.
    pub block_reason: Option<String>,
    /// End of the suspension.
    pub suspended_until: Option<DateTime<Utc>>,
    /// Number of orders placed.
    pub total_orders_count: i64,
    /// Amount spent.
    pub total_spent: f64,
}

/// Contact verification flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactVerification {
    /// Email address verified.
    pub email_verified: bool,
    /// Phone number verified.
    pub phone_verified: bool,
}

/// Notification and locale preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Preferences {
    /// Email notifications enabled.
    pub email_notifications_enabled: bool,
    /// Telegram notifications enabled.
    pub telegram_notifications_enabled: bool,
    /// SMS notifications enabled.
    pub sms_notifications_enabled: bool,
    /// Order status updates enabled.
    pub order_status_updates: bool,
    /// Promotional offers enabled.
    pub promotional_offers: bool,
    /// Preferred language.
    pub preferred_language: String,
    /// Preferred currency.
    pub preferred_currency: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_notifications_enabled: true,
            telegram_notifications_enabled: true,
            sms_notifications_enabled: false,
            order_status_updates: true,
            promotional_offers: false,
            preferred_language: "en".to_string(),
            preferred_currency: "USD".to_string(),
        }
    }
}

/// A delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAddress {
    /// Address id.
    pub id: Uuid,
    /// Label ("Home", "Work").
    pub label: String,
    /// Country.
    pub country: String,
    /// City.
    pub city: String,
    /// Street.
    pub street: Option<String>,
    /// Building.
    pub building: Option<String>,
    /// Apartment.
    pub apartment: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Default delivery address.
    pub is_default: bool,
}

impl CustomerAddress {
    /// Builds an address from an exchange item.
    ///
    /// # Errors
    ///
    /// Returns a message if a required value is missing or malformed.
    pub fn from_exchange(id: Uuid, item: &ExchangeRecord) -> Result<Self, String> {
        Ok(Self {
            id,
            label: required(item, "label")?,
            country: required(item, "country")?,
            city: required(item, "city")?,
            street: optional(item, "street"),
            building: optional(item, "building"),
            apartment: optional(item, "apartment"),
            postal_code: optional(item, "postalCode"),
            phone: optional(item, "phone"),
            is_default: item.get("isDefault").map(boolean).transpose()?.unwrap_or(false),
        })
    }

    /// Returns the exchange shape.
    #[must_use]
    pub fn to_exchange(&self) -> ExchangeRecord {
        ExchangeRecord::new()
            .with("id", self.id.to_string())
            .with("label", self.label.clone())
            .with("country", self.country.clone())
            .with("city", self.city.clone())
            .with_opt("street", self.street.clone())
            .with_opt("building", self.building.clone())
            .with_opt("apartment", self.apartment.clone())
            .with_opt("postalCode", self.postal_code.clone())
            .with_opt("phone", self.phone.clone())
            .with("isDefault", self.is_default.to_string())
    }
}

/// A wishlisted product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    /// Item id.
    pub id: Uuid,
    /// Product.
    pub product_id: Uuid,
    /// Product variant.
    pub product_sku_id: Option<Uuid>,
    /// When the product was added.
    pub added_at: DateTime<Utc>,
    /// Customer note.
    pub note: Option<String>,
}

impl WishlistItem {
    /// Builds a wishlist item from an exchange item.
    ///
    /// # Errors
    ///
    /// Returns a message if a required value is missing or malformed.
    pub fn from_exchange(id: Uuid, item: &ExchangeRecord) -> Result<Self, String> {
        Ok(Self {
            id,
            product_id: uuid(&required(item, "productId")?)?,
            product_sku_id: item.get("productSkuId").map(uuid).transpose()?,
            added_at: item
                .get("addedAt")
                .map(timestamp)
                .transpose()?
                .unwrap_or_else(Utc::now),
            note: optional(item, "note"),
        })
    }

    /// Returns the exchange shape.
    #[must_use]
    pub fn to_exchange(&self) -> ExchangeRecord {
        ExchangeRecord::new()
            .with("productId", self.product_id.to_string())
            .with_opt("productSkuId", self.product_sku_id.map(|id| id.to_string()))
            .with("addedAt", format_timestamp(self.added_at))
            .with_opt("note", self.note.clone())
    }
}

/// Customer profile aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Storage id.
    pub id: Uuid,
    /// Owning storefront (tenant).
    pub storefront_id: Uuid,
    /// External user id (natural key).
    pub user_id: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: Option<String>,
    /// Username.
    pub username: Option<String>,
    /// Avatar URL.
    pub photo_url: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Interface language.
    pub language_code: String,
    /// Status value object.
    pub account_status: AccountStatus,
    /// Verification value object.
    pub contact_verification: ContactVerification,
    /// Preferences value object.
    pub preferences: Preferences,
    /// Delivery addresses.
    pub addresses: Vec<CustomerAddress>,
    /// Wishlist.
    pub wishlist_items: Vec<WishlistItem>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

impl CustomerProfile {
    /// Creates a profile with default value objects.
    #[must_use]
    pub fn new(
        id: Uuid,
        storefront_id: Uuid,
        user_id: impl Into<String>,
        first_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            storefront_id,
            user_id: user_id.into(),
            first_name: first_name.into(),
            last_name: None,
            username: None,
            photo_url: None,
            phone: None,
            email: None,
            language_code: "en".to_string(),
            account_status: AccountStatus::default(),
            contact_verification: ContactVerification::default(),
            preferences: Preferences::default(),
            addresses: Vec::new(),
            wishlist_items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Creates a profile from an exchange record.
    ///
    /// # Errors
    ///
    /// Returns a message if the storefront or first name is missing or a
    /// value is malformed.
    pub fn from_exchange(
        id: Uuid,
        storefront: Option<&str>,
        user_id: &str,
        record: &ExchangeRecord,
    ) -> Result<Self, String> {
        let storefront = record
            .get("storefrontId")
            .or(storefront)
            .ok_or_else(|| "storefrontId is required".to_string())?;
        let mut profile = Self::new(id, uuid(storefront)?, user_id, required(record, "firstName")?);
        profile.apply(record)?;
        Ok(profile)
    }

    /// Applies the present fields of an exchange record.
    ///
    /// Identity fields (`id`, `storefrontId`, `userId`) are never changed.
    /// Side effects:
    /// - a changed phone or email resets its verification flag unless the
    ///   record sets the flag itself
    /// - a changed language code also becomes the preferred language unless
    ///   the record sets it
    /// - status `Active` clears block data; `Blocked` and `Suspended` stamp
    ///   `blockedAt` when it is unset
    ///
    /// # Errors
    ///
    /// Returns a message if a present value is malformed. Nothing is
    /// changed in that case.
    pub fn apply(&mut self, record: &ExchangeRecord) -> Result<(), String> {
        let mut next = self.clone();
        next.apply_contact(record)?;
        next.apply_status(record)?;
        next.apply_preferences(record)?;
        *self = next;
        Ok(())
    }

    fn apply_contact(&mut self, record: &ExchangeRecord) -> Result<(), String> {
        if let Some(first_name) = optional(record, "firstName") {
            self.first_name = first_name;
        }
        set_opt(&mut self.last_name, record, "lastName");
        set_opt(&mut self.username, record, "username");
        set_opt(&mut self.photo_url, record, "photoUrl");

        if let Some(phone) = optional(record, "phone") {
            if self.phone.as_deref() != Some(phone.as_str()) {
                self.contact_verification.phone_verified = false;
            }
            self.phone = Some(phone);
        }
        if let Some(email) = optional(record, "email") {
            if self.email.as_deref() != Some(email.as_str()) {
                self.contact_verification.email_verified = false;
            }
            self.email = Some(email);
        }
        if let Some(value) = record.get("emailVerified") {
            self.contact_verification.email_verified = boolean(value)?;
        }
        if let Some(value) = record.get("phoneVerified") {
            self.contact_verification.phone_verified = boolean(value)?;
        }

        if let Some(language) = optional(record, "languageCode") {
            if language != self.language_code && !record.has("preferredLanguage") {
                self.preferences.preferred_language.clone_from(&language);
            }
            self.language_code = language;
        }
        Ok(())
    }

    fn apply_status(&mut self, record: &ExchangeRecord) -> Result<(), String> {
        let status = &mut self.account_status;
        if let Some(value) = record.get("blockedAt") {
            status.blocked_at = Some(timestamp(value)?);
        }
        set_opt(&mut status.block_reason, record, "blockReason");
        if let Some(value) = record.get("suspendedUntil") {
            status.suspended_until = Some(timestamp(value)?);
        }
        if let Some(value) = record.get("totalOrdersCount") {
            status.total_orders_count = value
                .trim()
                .parse()
                .map_err(|_| format!("'{value}' is not an integer"))?;
        }
        if let Some(value) = record.get("totalSpent") {
            status.total_spent = value
                .trim()
                .parse()
                .map_err(|_| format!("'{value}' is not a decimal number"))?;
        }

        if let Some(value) = record.get("accountStatus") {
            status.state = value.parse()?;
            match status.state {
                AccountState::Active => {
                    status.blocked_at = None;
                    status.block_reason = None;
                },
                AccountState::Blocked | AccountState::Suspended => {
                    status.blocked_at.get_or_insert_with(Utc::now);
                },
                AccountState::Deleted => {},
            }
        }
        Ok(())
    }

    fn apply_preferences(&mut self, record: &ExchangeRecord) -> Result<(), String> {
        let preferences = &mut self.preferences;
        for (field, flag) in [
            ("emailNotificationsEnabled", &mut preferences.email_notifications_enabled),
            ("telegramNotificationsEnabled", &mut preferences.telegram_notifications_enabled),
            ("smsNotificationsEnabled", &mut preferences.sms_notifications_enabled),
            ("orderStatusUpdates", &mut preferences.order_status_updates),
            ("promotionalOffers", &mut preferences.promotional_offers),
        ] {
            if let Some(value) = record.get(field) {
                *flag = boolean(value)?;
            }
        }
        if let Some(language) = optional(record, "preferredLanguage") {
            preferences.preferred_language = language;
        }
        if let Some(currency) = optional(record, "preferredCurrency") {
            preferences.preferred_currency = currency;
        }
        Ok(())
    }

    /// Returns the exchange shape, with both collections populated.
    #[must_use]
    pub fn to_exchange(&self) -> ExchangeRecord {
        let status = &self.account_status;
        let preferences = &self.preferences;
        ExchangeRecord::new()
            .with("id", self.id.to_string())
            .with("storefrontId", self.storefront_id.to_string())
            .with("userId", self.user_id.clone())
            .with("firstName", self.first_name.clone())
            .with_opt("lastName", self.last_name.clone())
            .with_opt("username", self.username.clone())
            .with_opt("photoUrl", self.photo_url.clone())
            .with_opt("phone", self.phone.clone())
            .with_opt("email", self.email.clone())
            .with("languageCode", self.language_code.clone())
            .with("accountStatus", status.state.as_str())
            .with_opt("blockedAt", status.blocked_at.map(format_timestamp))
            .with_opt("blockReason", status.block_reason.clone())
            .with_opt("suspendedUntil", status.suspended_until.map(format_timestamp))
            .with("totalOrdersCount", status.total_orders_count.to_string())
            .with("totalSpent", status.total_spent.to_string())
            .with("emailVerified", self.contact_verification.email_verified.to_string())
            .with("phoneVerified", self.contact_verification.phone_verified.to_string())
            .with(
                "emailNotificationsEnabled",
                preferences.email_notifications_enabled.to_string(),
            )
            .with(
                "telegramNotificationsEnabled",
                preferences.telegram_notifications_enabled.to_string(),
            )
            .with(
                "smsNotificationsEnabled",
                preferences.sms_notifications_enabled.to_string(),
            )
            .with("orderStatusUpdates", preferences.order_status_updates.to_string())
            .with("promotionalOffers", preferences.promotional_offers.to_string())
            .with("preferredLanguage", preferences.preferred_language.clone())
            .with("preferredCurrency", preferences.preferred_currency.clone())
            .with_collection(
                "addresses",
                self.addresses.iter().map(CustomerAddress::to_exchange).collect(),
            )
            .with_collection(
                "wishlistItems",
                self.wishlist_items.iter().map(WishlistItem::to_exchange).collect(),
            )
    }
}

/// Formats a timestamp the way exports carry it.
#[must_use]
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn optional(record: &ExchangeRecord, field: &str) -> Option<String> {
    record.get(field).map(str::to_string)
}

fn required(record: &ExchangeRecord, field: &str) -> Result<String, String> {
    optional(record, field).ok_or_else(|| format!("{field} is required"))
}

fn set_opt(target: &mut Option<String>, record: &ExchangeRecord, field: &str) {
    if let Some(value) = optional(record, field) {
        *target = Some(value);
    }
}

fn boolean(value: &str) -> Result<bool, String> {
    parse_bool(value).ok_or_else(|| format!("'{value}' is not a boolean"))
}

fn uuid(value: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value.trim()).map_err(|_| format!("'{value}' is not a UUID"))
}

fn timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("'{value}' is not an RFC 3339 timestamp"))
}
