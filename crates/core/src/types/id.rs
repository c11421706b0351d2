//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types.

/// Macro to define a type-safe ID wrapper.
///
/// Two backing representations are supported:
/// - `str` - an owned `String`, for opaque identifiers such as Firebase UIDs
/// - `u32` - for numeric catalog identifiers
///
/// Both forms derive `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// plus `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, and implement `Display`
/// and the obvious `From` conversions.
///
/// # Example
///
/// ```rust
/// # use shopez_core::define_id;
/// define_id!(SessionId, str);
/// define_id!(SkuId, u32);
///
/// let session = SessionId::new("abc123");
/// let sku = SkuId::new(7);
///
/// // These are different types, so this won't compile:
/// // let _: SessionId = sku;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, str) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
    ($name:ident, u32) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create a new ID from a u32 value.
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Get the underlying u32 value.
            #[must_use]
            pub const fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define standard entity IDs.
//
// `UserId` is a Firebase Auth UID, opaque to us. `ProductId` is a numeric
// catalog id; it doubles as the document key for cart items, where it is
// rendered in decimal.
define_id!(UserId, str);
define_id!(ProductId, u32);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn user_id_round_trips_through_json() {
        let id = UserId::new("firebase-uid-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"firebase-uid-1\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn product_id_serializes_as_bare_number() {
        let id = ProductId::new(14);
        assert_eq!(serde_json::to_string(&id).unwrap(), "14");
        assert_eq!(id.to_string(), "14");
    }
}
