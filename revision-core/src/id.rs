use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CoreError;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Opaque 12-byte document identifier: 4-byte seconds timestamp, 5 random
/// bytes, 3-byte process-local counter. Encodes to/from a 24-char hex string
/// at every API boundary; never accepted in both forms at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId([u8; 12]);

impl DocId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];

        let secs = chrono::Utc::now().timestamp() as u32;
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());

        // Counter precedes the random bytes in byte order so that ids minted
        // by this process within the same second still compare monotonically.
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;
        bytes[4..7].copy_from_slice(&counter.to_be_bytes()[1..4]);

        let mut rand_bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut rand_bytes);
        bytes[7..12].copy_from_slice(&rand_bytes);

        DocId(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 24 {
            return Err(CoreError::MalformedId(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CoreError::MalformedId(s.to_string()))?;
        Ok(DocId(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != 12 {
            return Err(CoreError::MalformedId(hex::encode(bytes)));
        }
        let mut arr = [0u8; 12];
        arr.copy_from_slice(bytes);
        Ok(DocId(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for DocId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DocId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = DocId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(DocId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(DocId::from_hex("deadbeef").is_err());
    }

    #[test]
    fn ids_generated_in_sequence_are_strictly_ordered() {
        let a = DocId::new();
        let b = DocId::new();
        assert!(a < b, "natural id order must be monotonic within a process");
    }

    #[test]
    fn serde_round_trip() {
        let id = DocId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: DocId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
