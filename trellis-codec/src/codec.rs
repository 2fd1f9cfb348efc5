// The concatenation of element encodings sorts the same way the tuple
// sorts element-wise:
//
// - Variable-length payloads (bytes, text) escape 0x00 as 0x00 0xFF and
//   end with a bare 0x00 terminator. The terminator is the lowest byte, so
//   a strict prefix sorts before every extension of it.
// - Nested tuples reuse 0x00 as their terminator, which forces Null inside
//   a tuple to take the two-byte form 0x00 0xFF; top-level Null stays one
//   byte.
// - Negative integer payloads are offset by 2^64-1 so they ascend with
//   value under the 0x06 tag. Zero and positives get their own tags.
// - Floats are stored as their sortable bit image (see float_image).
//
// Decoding is the exact inverse and must reject anything the encoder could
// not have produced.

use memchr::{memchr, memchr_iter};
use trellis_base::{corrupt, Error, ErrorKind, Result};
use uuid::Uuid;

use crate::scalar::{
    float_from_image, float_image, ContentHash, Scalar, TAG_BYTES, TAG_FALSE, TAG_FLOAT, TAG_HASH,
    TAG_INT_NEG, TAG_INT_POS, TAG_INT_ZERO, TAG_NULL, TAG_TEXT, TAG_TRUE, TAG_TUPLE, TAG_UUID,
};

/// Encode a tuple as one order-preserving byte string.
pub fn encode(tuple: &[Scalar]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in tuple {
        encode_one(item, false, &mut out);
    }
    out
}

fn encode_one(value: &Scalar, nested: bool, out: &mut Vec<u8>) {
    match value {
        Scalar::Null => {
            out.push(TAG_NULL);
            if nested {
                out.push(0xFF);
            }
        }
        Scalar::Bytes(raw) => {
            out.push(TAG_BYTES);
            escape_into(raw, out);
            out.push(0x00);
        }
        Scalar::Text(text) => {
            out.push(TAG_TEXT);
            escape_into(text.as_bytes(), out);
            out.push(0x00);
        }
        Scalar::Tuple(items) => {
            out.push(TAG_TUPLE);
            for item in items {
                encode_one(item, true, out);
            }
            out.push(0x00);
        }
        Scalar::Int(0) => out.push(TAG_INT_ZERO),
        Scalar::Int(n) if *n > 0 => {
            out.push(TAG_INT_POS);
            out.extend_from_slice(&(*n as u64).to_be_bytes());
        }
        Scalar::Int(n) => {
            out.push(TAG_INT_NEG);
            let image = (u64::MAX as i128 + *n as i128) as u64;
            out.extend_from_slice(&image.to_be_bytes());
        }
        Scalar::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&float_image(*f).to_be_bytes());
        }
        Scalar::Bool(true) => out.push(TAG_TRUE),
        Scalar::Bool(false) => out.push(TAG_FALSE),
        Scalar::Uuid(u) => {
            out.push(TAG_UUID);
            out.extend_from_slice(u.as_bytes());
        }
        Scalar::Hash(h) => {
            out.push(TAG_HASH);
            out.extend_from_slice(h.as_bytes());
        }
    }
}

fn escape_into(raw: &[u8], out: &mut Vec<u8>) {
    let mut from = 0;
    for zero in memchr_iter(0x00, raw) {
        out.extend_from_slice(&raw[from..=zero]);
        out.push(0xFF);
        from = zero + 1;
    }
    out.extend_from_slice(&raw[from..]);
}

/// Decode a whole key back into its tuple.
pub fn decode(data: &[u8]) -> Result<Vec<Scalar>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (value, next) = decode_one(data, pos)?;
        out.push(value);
        pos = next;
    }
    Ok(out)
}

fn decode_one(data: &[u8], pos: usize) -> Result<(Scalar, usize)> {
    let tag = *data.get(pos).ok_or_else(|| corrupt("truncated scalar"))?;
    let pos = pos + 1;
    match tag {
        TAG_NULL => Ok((Scalar::Null, pos)),
        TAG_BYTES => {
            let (raw, next) = unescape(data, pos)?;
            Ok((Scalar::Bytes(raw), next))
        }
        TAG_TEXT => {
            let (raw, next) = unescape(data, pos)?;
            let text =
                String::from_utf8(raw).map_err(|e| Error::wrap(ErrorKind::CorruptData, e))?;
            Ok((Scalar::Text(text), next))
        }
        TAG_TUPLE => {
            let mut items = Vec::new();
            let mut pos = pos;
            loop {
                match data.get(pos) {
                    None => return Err(corrupt("unterminated nested tuple")),
                    Some(0x00) => {
                        if data.get(pos + 1) == Some(&0xFF) {
                            items.push(Scalar::Null);
                            pos += 2;
                        } else {
                            return Ok((Scalar::Tuple(items), pos + 1));
                        }
                    }
                    Some(_) => {
                        let (item, next) = decode_one(data, pos)?;
                        items.push(item);
                        pos = next;
                    }
                }
            }
        }
        TAG_INT_ZERO => Ok((Scalar::Int(0), pos)),
        TAG_INT_POS => {
            let image = read_u64(data, pos)?;
            if image > i64::MAX as u64 {
                return Err(corrupt("positive integer out of range"));
            }
            Ok((Scalar::Int(image as i64), pos + 8))
        }
        TAG_INT_NEG => {
            let image = read_u64(data, pos)?;
            let value = image as i128 - u64::MAX as i128;
            if value >= 0 || value < i64::MIN as i128 {
                return Err(corrupt("negative integer out of range"));
            }
            Ok((Scalar::Int(value as i64), pos + 8))
        }
        TAG_FLOAT => {
            let image = read_u64(data, pos)?;
            Ok((Scalar::Float(float_from_image(image)), pos + 8))
        }
        TAG_TRUE => Ok((Scalar::Bool(true), pos)),
        TAG_FALSE => Ok((Scalar::Bool(false), pos)),
        TAG_UUID => {
            let raw: [u8; 16] = data
                .get(pos..pos + 16)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| corrupt("truncated uuid"))?;
            Ok((Scalar::Uuid(Uuid::from_bytes(raw)), pos + 16))
        }
        TAG_HASH => {
            let raw: [u8; 32] = data
                .get(pos..pos + 32)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| corrupt("truncated content hash"))?;
            Ok((Scalar::Hash(ContentHash::new(raw)), pos + 32))
        }
        other => Err(corrupt(format!("unknown scalar tag {other:#04x}"))),
    }
}

// Scan for the bare-0x00 terminator: a 0x00 followed by 0xFF is a literal
// zero byte, any other 0x00 ends the payload.
fn unescape(data: &[u8], mut pos: usize) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    loop {
        let rest = data
            .get(pos..)
            .ok_or_else(|| corrupt("unterminated byte payload"))?;
        match memchr(0x00, rest) {
            None => return Err(corrupt("unterminated byte payload")),
            Some(zero) => {
                out.extend_from_slice(&rest[..zero]);
                pos += zero + 1;
                if data.get(pos) == Some(&0xFF) {
                    out.push(0x00);
                    pos += 1;
                } else {
                    return Ok((out, pos));
                }
            }
        }
    }
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    let raw: [u8; 8] = data
        .get(pos..pos + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| corrupt("truncated integer payload"))?;
    Ok(u64::from_be_bytes(raw))
}

/// The shortest byte string strictly greater than every string that starts
/// with `data`: increment the rightmost non-0xFF byte and drop the rest.
/// None when every byte is 0xFF; callers then use `data ++ 0x00` as their
/// exclusive upper bound, which no key of length |data| reaches while every
/// longer extension of `data` exceeds it.
pub fn successor(data: &[u8]) -> Option<Vec<u8>> {
    if data.is_empty() {
        return Some(vec![0x00]);
    }
    for i in (0..data.len()).rev() {
        if data[i] != 0xFF {
            let mut out = data[..=i].to_vec();
            out[i] += 1;
            return Some(out);
        }
    }
    None
}
