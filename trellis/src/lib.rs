// The top-level handle: pooled storage plus the registry of named
// relations. Everything else is re-exported from the member crates.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_base::invalid_input;

pub use trellis_base::{Error, ErrorKind, Result};
pub use trellis_codec::{decode, encode, successor, ContentHash, Scalar};
pub use trellis_kv::{
    pool_size_default, Cnx, Storage, Txn, DEFAULT_TABLE, MAX_KEY_LEN, MAX_VALUE_LEN,
};
pub use trellis_nstore::{permutations_for_arity, Bindings, NStore, Term, MAX_ARITY};

/// An open database. Relations are immutable once registered, so lookups
/// hand out cheap `Arc` clones and only registration takes the write side
/// of the lock.
pub struct Db {
    storage: Storage,
    registry: RwLock<HashMap<String, Arc<NStore>>>,
}

pub fn open(path: impl AsRef<Path>) -> Result<Db> {
    open_with(path, None, None)
}

pub fn open_with(
    path: impl AsRef<Path>,
    pool_size: Option<usize>,
    table: Option<&str>,
) -> Result<Db> {
    let storage = Storage::open_with(path, pool_size, table)?;
    Ok(Db {
        storage,
        registry: RwLock::new(HashMap::new()),
    })
}

impl Db {
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Create a relation with key prefix `(name,)`, register it under that
    /// name, and return it.
    pub fn nstore(&self, name: &str, arity: usize) -> Result<Arc<NStore>> {
        let ns = Arc::new(NStore::named(name, arity)?);
        self.register(name, ns.clone());
        Ok(ns)
    }

    /// Register a relation; replaces any previous entry under the name.
    pub fn register(&self, name: &str, ns: Arc<NStore>) {
        self.registry.write().insert(name.to_string(), ns);
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<NStore>> {
        self.registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| invalid_input(format!("no relation named {name:?}")))
    }

    pub fn close(&self) {
        self.storage.close();
    }
}

/// One write transaction on a pooled connection.
pub fn with_txn<T, F>(db: &Db, f: F) -> Result<T>
where
    F: FnOnce(&Txn) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    trellis_kv::with_txn(&db.storage, f)
}

/// One read-only transaction on a pooled connection, without the write
/// mutex.
pub fn with_txn_read<T, F>(db: &Db, f: F) -> Result<T>
where
    F: FnOnce(&Txn) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    trellis_kv::with_txn_read(&db.storage, f)
}
