// The byte-ordered key-value layer over SQLite, and the worker pool that
// feeds it. One logical table of (key BLOB PRIMARY KEY, value BLOB); the
// primary-key b-tree is the sorted index every range scan rides. All the
// ordering intelligence lives in the key bytes, so this crate never looks
// inside a key.

mod store;
mod txn;

pub use store::{pool_size_default, Cnx, Storage, DEFAULT_TABLE};
pub use txn::{with_txn, with_txn_read, Txn, MAX_KEY_LEN, MAX_VALUE_LEN};
