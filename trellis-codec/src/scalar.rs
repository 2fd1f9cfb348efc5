use std::cmp::Ordering;

use trellis_base::{invalid_input, Result};
use uuid::Uuid;

// Tag bytes are the cross-type sort order and are frozen: keys written by
// any version of this crate must interleave correctly with keys written by
// any other. Integers take one of three tags depending on sign, booleans
// one of two depending on value.
pub(crate) const TAG_NULL: u8 = 0x00;
pub(crate) const TAG_BYTES: u8 = 0x01;
pub(crate) const TAG_TEXT: u8 = 0x02;
pub(crate) const TAG_TUPLE: u8 = 0x03;
pub(crate) const TAG_INT_ZERO: u8 = 0x04;
pub(crate) const TAG_INT_POS: u8 = 0x05;
pub(crate) const TAG_INT_NEG: u8 = 0x06;
pub(crate) const TAG_FLOAT: u8 = 0x07;
pub(crate) const TAG_TRUE: u8 = 0x08;
pub(crate) const TAG_FALSE: u8 = 0x09;
pub(crate) const TAG_UUID: u8 = 0x0A;
pub(crate) const TAG_HASH: u8 = 0x0B;

/// A 32-byte content hash carried opaquely through tuples.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn new(raw: [u8; 32]) -> ContentHash {
        ContentHash(raw)
    }

    /// Parse the 64-character lowercase-or-uppercase hex form.
    pub fn from_hex(hex: &str) -> Result<ContentHash> {
        if hex.len() != 64 {
            return Err(invalid_input(format!(
                "content hash hex must be 64 characters, got {}",
                hex.len()
            )));
        }
        let mut raw = [0u8; 32];
        faster_hex::hex_decode(hex.as_bytes(), &mut raw)
            .map_err(|_| invalid_input("content hash is not valid hex"))?;
        Ok(ContentHash(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", faster_hex::hex_string(&self.0))
    }
}

/// One ground value understood by the codec. Variants mirror the tag bytes
/// one-for-one, except that `Int` covers all three integer tags.
#[derive(Clone, Debug)]
pub enum Scalar {
    Null,
    Bytes(Vec<u8>),
    Text(String),
    Tuple(Vec<Scalar>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    Hash(ContentHash),
}

impl Scalar {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Scalar::Null => TAG_NULL,
            Scalar::Bytes(_) => TAG_BYTES,
            Scalar::Text(_) => TAG_TEXT,
            Scalar::Tuple(_) => TAG_TUPLE,
            Scalar::Int(0) => TAG_INT_ZERO,
            Scalar::Int(n) if *n > 0 => TAG_INT_POS,
            Scalar::Int(_) => TAG_INT_NEG,
            Scalar::Float(_) => TAG_FLOAT,
            Scalar::Bool(true) => TAG_TRUE,
            Scalar::Bool(false) => TAG_FALSE,
            Scalar::Uuid(_) => TAG_UUID,
            Scalar::Hash(_) => TAG_HASH,
        }
    }
}

// The sortable image of a float: flip the sign bit of the big-endian IEEE
// representation, or every bit when the sign is negative. Total order over
// the whole line including infinities and NaNs.
pub(crate) fn float_image(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

pub(crate) fn float_from_image(image: u64) -> f64 {
    if image >> 63 == 1 {
        f64::from_bits(image ^ (1 << 63))
    } else {
        f64::from_bits(!image)
    }
}

// Comparison mirrors the encoded byte order exactly: tag byte first, then
// the per-type payload order. The frozen tags put zero below positive ints
// below negative ints, and true below false. Floats compare and equate by
// their bit image, so NaN == NaN and -0.0 != 0.0.
impl Ord for Scalar {
    fn cmp(&self, other: &Scalar) -> Ordering {
        match self.tag().cmp(&other.tag()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Tuple(a), Scalar::Tuple(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => float_image(*a).cmp(&float_image(*b)),
            (Scalar::Bool(_), Scalar::Bool(_)) => Ordering::Equal,
            (Scalar::Uuid(a), Scalar::Uuid(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Scalar::Hash(a), Scalar::Hash(b)) => a.as_bytes().cmp(b.as_bytes()),
            _ => unreachable!("equal tags on differing variants"),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Scalar) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Scalar) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl From<i64> for Scalar {
    fn from(n: i64) -> Scalar {
        Scalar::Int(n)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Scalar {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Scalar {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Scalar {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Scalar {
        Scalar::Text(s)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(b: Vec<u8>) -> Scalar {
        Scalar::Bytes(b)
    }
}

impl From<&[u8]> for Scalar {
    fn from(b: &[u8]) -> Scalar {
        Scalar::Bytes(b.to_vec())
    }
}

impl From<Uuid> for Scalar {
    fn from(u: Uuid) -> Scalar {
        Scalar::Uuid(u)
    }
}

impl From<ContentHash> for Scalar {
    fn from(h: ContentHash) -> Scalar {
        Scalar::Hash(h)
    }
}
