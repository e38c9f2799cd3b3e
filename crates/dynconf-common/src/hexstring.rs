//! Hex-encoded byte strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Error returned when a hex string is malformed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid hex string: {0}")]
pub struct HexError(#[from] hex::FromHexError);

/// Bytes that travel as a lower-case hex string.
///
/// An empty string decodes to an empty byte vector and empty bytes encode to
/// an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HexString(pub Vec<u8>);

impl HexString {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper and returns the decoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for HexString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HexString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for HexString {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self(hex::decode(s)?))
    }
}

impl Serialize for HexString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for HexString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display() {
        assert_eq!(HexString::default().to_string(), "");
        assert_eq!(HexString::new([0x01, 0x02, 0x03]).to_string(), "010203");
        assert_eq!(HexString::new([0xff, 0xaa, 0x55]).to_string(), "ffaa55");
    }

    #[test]
    fn test_parse() {
        assert_eq!("".parse::<HexString>().unwrap(), HexString::default());
        assert_eq!(
            "DEADbeef".parse::<HexString>().unwrap().as_bytes(),
            &[0xde, 0xad, 0xbe, 0xef]
        );
        assert!("abc".parse::<HexString>().is_err());
        assert!("zz".parse::<HexString>().is_err());
    }

    #[test]
    fn test_json() {
        let value = HexString::new([0x0a, 0xff]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"0aff\"");
        assert_eq!(serde_json::to_string(&HexString::default()).unwrap(), "\"\"");

        let decoded: HexString = serde_json::from_str("\"0aff\"").unwrap();
        assert_eq!(decoded, value);

        // not a JSON string at all
        assert!(serde_json::from_str::<HexString>("123").is_err());
        assert!(serde_json::from_str::<HexString>("\"0g\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_display_parses_back(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let value = HexString::new(bytes);
            let parsed: HexString = value.to_string().parse().unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
