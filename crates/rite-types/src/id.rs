use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered ID (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }

            /// Parse from the hyphenated or simple UUID form.
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                uuid::Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
            }

            /// Whether `prefix` abbreviates this ID (as typed on a command line).
            pub fn matches_prefix(&self, prefix: &str) -> bool {
                let prefix = prefix.trim().to_ascii_lowercase();
                !prefix.is_empty()
                    && (self.0.to_string().starts_with(&prefix)
                        || self.0.simple().to_string().starts_with(&prefix))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one rite: one transactional run of the scaffolding engine.
    ///
    /// UUID v7, so IDs generated later sort later.
    RiteId
);

uuid_id!(
    /// Identifier of a single ledger entry within a rite.
    EntryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_time_ordered() {
        let a = RiteId::new();
        let b = RiteId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn parse_display_roundtrip() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            RiteId::parse("not-a-uuid"),
            Err(TypeError::InvalidId(_))
        ));
    }

    #[test]
    fn prefix_matching() {
        let id = RiteId::new();
        assert!(id.matches_prefix(&id.short_id()));
        assert!(id.matches_prefix(&id.short_id().to_uppercase()));
        assert!(!id.matches_prefix(""));
        assert!(!id.matches_prefix("zzzz"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RiteId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
