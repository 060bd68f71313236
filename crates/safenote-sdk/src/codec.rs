//! Byte encodings shared by the gateways: `0x`-hex strings on the wire and
//! 32-byte big-endian words for clear values.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SdkError};

pub const WORD_SIZE: usize = 32;

/// Opaque bytes carried as a `0x`-prefixed hex string.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(stripped)
            .map(HexBytes)
            .map_err(|e| SdkError::Serialization(format!("invalid hex: {}", e)))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for HexBytes {
    fn from(bytes: Vec<u8>) -> Self {
        HexBytes(bytes)
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HexBytes::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Reference to a ciphertext stored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub String);

impl CiphertextHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        CiphertextHandle(handle.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        CiphertextHandle(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One 32-byte big-endian word per value, in order.
pub fn encode_clear_values(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * WORD_SIZE);
    for value in values {
        out.extend_from_slice(&[0u8; WORD_SIZE - 8]);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

pub fn decode_clear_values(bytes: &[u8]) -> Result<Vec<u64>> {
    if bytes.len() % WORD_SIZE != 0 {
        return Err(SdkError::Serialization(format!(
            "clear values must be a multiple of {} bytes, got {}",
            WORD_SIZE,
            bytes.len()
        )));
    }

    bytes
        .chunks(WORD_SIZE)
        .map(|word| {
            let (high, low) = word.split_at(WORD_SIZE - 8);
            if high.iter().any(|&b| b != 0) {
                return Err(SdkError::Serialization(
                    "clear value does not fit in 64 bits".into(),
                ));
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(low);
            Ok(u64::from_be_bytes(buf))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes_accepts_optional_prefix() {
        assert_eq!(HexBytes::from_hex("0xdead").unwrap().0, vec![0xde, 0xad]);
        assert_eq!(HexBytes::from_hex("beef").unwrap().0, vec![0xbe, 0xef]);
        assert!(HexBytes::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_hex_bytes_json_shape() {
        let json = serde_json::to_string(&HexBytes(vec![1, 2])).unwrap();
        assert_eq!(json, "\"0x0102\"");
    }

    #[test]
    fn test_clear_values_are_word_aligned() {
        let encoded = encode_clear_values(&[42, u64::MAX]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 42);
        assert_eq!(decode_clear_values(&encoded).unwrap(), vec![42, u64::MAX]);
    }

    #[test]
    fn test_decode_rejects_overflow_and_ragged_input() {
        let mut word = vec![0u8; 32];
        word[0] = 1;
        assert!(decode_clear_values(&word).is_err());
        assert!(decode_clear_values(&[0u8; 31]).is_err());
    }
}
