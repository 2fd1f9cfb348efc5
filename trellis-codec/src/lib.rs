// Tuple keys must sort byte-lexicographically exactly as their decoded
// tuples sort element-wise. Everything in this crate serves that one
// property; the kv and nstore layers above only ever compare raw bytes.

mod codec;
mod scalar;

pub use codec::{decode, encode, successor};
pub use scalar::{ContentHash, Scalar};
