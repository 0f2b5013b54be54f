//! ID generation abstractions.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Define a newtype ID wrapper around a nanoid-backed string with a type prefix.
///
/// The ID format is `{prefix}{nanoid}`. Generated with [`nanoid`], parsed
/// losslessly from any `&str`/`String` (so ids round-trip through the state
/// store's JSON file without validation on load).
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random id with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(16)))
            }

            /// Wrap an existing string (e.g. one read back from the state store).
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an attached interactive agent session.
    pub struct SessionId("ses-");
}

define_id! {
    /// Unique identifier for a shared bare mirror backing many working copies.
    pub struct WorktreeBaseId("wtb-");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_round_trips_through_string() {
        let id = SessionId::new();
        let back = SessionId::from_string(id.as_str());
        assert_eq!(id, back);
    }

    #[test]
    fn session_id_has_expected_prefix() {
        let id = SessionId::new();
        assert!(id.as_str().starts_with("ses-"));
    }
}
