use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use phonestore_core::{DomainError, DomainResult, Entity, PhoneId, StoreId, ValueObject};

/// Phone manufacturer category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneModel {
    Apple,
    Samsung,
    Google,
    Xiaomi,
}

impl PhoneModel {
    pub const ALL: [PhoneModel; 4] = [
        PhoneModel::Apple,
        PhoneModel::Samsung,
        PhoneModel::Google,
        PhoneModel::Xiaomi,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PhoneModel::Apple => "APPLE",
            PhoneModel::Samsung => "SAMSUNG",
            PhoneModel::Google => "GOOGLE",
            PhoneModel::Xiaomi => "XIAOMI",
        }
    }
}

impl core::fmt::Display for PhoneModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PhoneModel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        PhoneModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown phone model: {s:?}")))
    }
}

/// Unit price in minor units (cents).
///
/// The wire form is a decimal number (`799.99`); it is rounded to the nearest
/// cent on the way in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Price(u64);

impl ValueObject for Price {}

impl Price {
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn from_decimal(value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::validation("price must be a finite number"));
        }
        if value < 0.0 {
            return Err(DomainError::validation("price cannot be negative"));
        }
        let cents = (value * 100.0).round();
        if cents > u64::MAX as f64 {
            return Err(DomainError::validation("price is out of range"));
        }
        Ok(Self(cents as u64))
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Price::from_decimal(value).map_err(serde::de::Error::custom)
    }
}

/// A phone that has not been stored yet: no id, no store, no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneDraft {
    pub model: PhoneModel,
    pub price: Price,
    pub quantity: u32,
}

/// Loosely-typed draft as it arrives from a request body or an envelope.
///
/// Fields are kept optional so a missing field becomes a `Validation` error
/// naming the field instead of a serde message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPhoneDraft {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl RawPhoneDraft {
    pub fn validate(self) -> DomainResult<PhoneDraft> {
        let model = match self.model.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.parse()?,
            _ => return Err(DomainError::validation("phone model is required")),
        };
        let price = match self.price {
            Some(p) => Price::from_decimal(p)?,
            None => return Err(DomainError::validation("phone price is required")),
        };
        let quantity = match self.quantity {
            Some(q) if q < 0 => return Err(DomainError::validation("quantity cannot be negative")),
            Some(q) => u32::try_from(q)
                .map_err(|_| DomainError::validation("quantity is out of range"))?,
            None => return Err(DomainError::validation("phone quantity is required")),
        };
        Ok(PhoneDraft {
            model,
            price,
            quantity,
        })
    }
}

/// A stocked phone record.
///
/// `is_available` is never set directly: it is derived from `quantity`
/// whenever an item is built or its quantity changes. Items are written to
/// the wire but never read back from it, so there is no way to build one
/// with the two out of step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneInventoryItem {
    id: PhoneId,
    model: PhoneModel,
    price: Price,
    quantity: u32,
    is_available: bool,
    store_id: Option<StoreId>,
    date_added: DateTime<Utc>,
}

impl PhoneInventoryItem {
    pub fn new(
        id: PhoneId,
        model: PhoneModel,
        price: Price,
        quantity: u32,
        store_id: Option<StoreId>,
        date_added: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            model,
            price,
            quantity,
            is_available: quantity > 0,
            store_id,
            date_added,
        }
    }

    /// Materialize a draft with a fresh id.
    pub fn from_draft(draft: PhoneDraft, store_id: Option<StoreId>, date_added: DateTime<Utc>) -> Self {
        Self::new(
            PhoneId::new(),
            draft.model,
            draft.price,
            draft.quantity,
            store_id,
            date_added,
        )
    }

    pub fn id_typed(&self) -> PhoneId {
        self.id
    }

    pub fn model(&self) -> PhoneModel {
        self.model
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn is_available(&self) -> bool {
        self.is_available
    }

    pub fn store_id(&self) -> Option<&StoreId> {
        self.store_id.as_ref()
    }

    pub fn belongs_to(&self, store_id: &StoreId) -> bool {
        self.store_id.as_ref() == Some(store_id)
    }

    pub fn date_added(&self) -> DateTime<Utc> {
        self.date_added
    }

    /// Same record with a new quantity and availability recomputed.
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            is_available: quantity > 0,
            ..self.clone()
        }
    }

    /// Quantity after adding `amount`, or `Validation` on overflow.
    pub fn increased_by(&self, amount: u32) -> DomainResult<u32> {
        self.quantity
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation(format!("quantity overflow for phone {}", self.id)))
    }

    /// Quantity after removing `amount`; never clamps.
    pub fn decreased_by(&self, amount: u32) -> DomainResult<u32> {
        self.quantity
            .checked_sub(amount)
            .ok_or_else(|| DomainError::insufficient_quantity(amount, self.quantity))
    }
}

impl Entity for PhoneInventoryItem {
    type Id = PhoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
