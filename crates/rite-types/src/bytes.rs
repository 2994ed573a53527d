//! Serde adapters that store raw file bodies as base64 strings.
//!
//! Ledger files are JSON; a `Vec<u8>` would otherwise serialize as an array of
//! numbers, roughly four times the size of the base64 form.

use ::base64::engine::general_purpose::STANDARD;
use ::base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

/// `#[serde(with = "rite_types::bytes::base64")]` for `Vec<u8>`.
pub mod base64 {
    use super::*;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "rite_types::bytes::base64_opt")]` for `Option<Vec<u8>>`.
pub mod base64_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        data: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
