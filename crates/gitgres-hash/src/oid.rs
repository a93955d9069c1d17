use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Number of raw bytes in an object id.
pub const OID_RAW_LEN: usize = 20;
/// Number of hex characters in a fully spelled-out object id.
pub const OID_HEX_LEN: usize = 40;

/// A git object identifier: the 20-byte SHA-1 of an object's canonical
/// pre-image.
///
/// Ordering is byte-wise lexicographic, matching the ordering the storage
/// indexes use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_RAW_LEN]);

impl ObjectId {
    /// The all-zero OID. Reserved as the "no ref" sentinel in update
    /// parameters; never stored.
    pub const ZERO: Self = Self([0u8; OID_RAW_LEN]);

    /// Create an ObjectId from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != OID_RAW_LEN {
            return Err(HashError::InvalidByteLength {
                expected: OID_RAW_LEN,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; OID_RAW_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Parse from a 40-character hex string. Case-insensitive on input.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != OID_HEX_LEN {
            return Err(HashError::InvalidHexLength {
                expected: OID_HEX_LEN,
                actual: hex.len(),
            });
        }
        let mut raw = [0u8; OID_RAW_LEN];
        hex_decode(hex, &mut raw)?;
        Ok(Self(raw))
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Is this the all-zero sentinel?
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase 40-character hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// First byte of the id (fan-out / loose-path prefix).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Loose object path component: `"xx/xxxx..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const EMPTY_BLOB: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    #[test]
    fn from_hex_and_back() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(oid.to_hex(), EMPTY_BLOB);
        assert_eq!(oid.as_bytes().len(), 20);
    }

    #[test]
    fn display_roundtrip() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        let parsed: ObjectId = oid.to_string().parse().unwrap();
        assert_eq!(parsed, oid);
    }

    #[test]
    fn case_insensitive_input_lowercase_output() {
        let upper = ObjectId::from_hex("E69DE29BB2D1D6434B8B29AE775AD8C2E48C5391").unwrap();
        assert_eq!(upper.to_hex(), EMPTY_BLOB);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            ObjectId::from_hex("abcd").unwrap_err(),
            HashError::InvalidHexLength { expected: 40, actual: 4 }
        ));
        assert!(ObjectId::from_hex(&"a".repeat(41)).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let err = ObjectId::from_hex(&"g".repeat(40)).unwrap_err();
        assert!(matches!(err, HashError::InvalidHex { position: 0, .. }));
    }

    #[test]
    fn from_bytes_wrong_length() {
        let err = ObjectId::from_bytes(&[0u8; 19]).unwrap_err();
        assert!(matches!(err, HashError::InvalidByteLength { expected: 20, actual: 19 }));
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let b = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        let c = ObjectId::from_hex("ff00000000000000000000000000000000000000").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn zero_sentinel() {
        assert!(ObjectId::ZERO.is_zero());
        assert_eq!(
            ObjectId::ZERO.to_hex(),
            "0000000000000000000000000000000000000000"
        );
        assert!(!ObjectId::from_hex(EMPTY_BLOB).unwrap().is_zero());
    }

    #[test]
    fn usable_as_map_key() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        let mut map = HashMap::new();
        map.insert(oid, "value");
        assert_eq!(map.get(&oid), Some(&"value"));
    }

    #[test]
    fn loose_path_splits_first_byte() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(oid.loose_path(), format!("e6/{}", &EMPTY_BLOB[2..]));
    }

    #[test]
    fn debug_shows_short_hash() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(format!("{:?}", oid), "ObjectId(e69de29b)");
    }
}
