//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. A `Price` of
/// 79999 cents equals any other `Price` of 79999 cents; to "change" a value
/// object, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct Price(u64);
///
/// impl ValueObject for Price {}
///
/// assert_eq!(Price(100), Price(100));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
