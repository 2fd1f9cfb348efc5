// Raw connections and in-transaction connections are distinct types. Every
// operation takes &Txn, so a nested call always participates in its
// caller's transaction; Cnx::with_txn is the only way to make one. Commit
// happens on Ok; an Err return (or a panic unwinding through) drops the
// rusqlite transaction, which rolls back.

use rusqlite::OptionalExtension;
use trellis_base::{invalid_input, Result};

use crate::store::{Cnx, Storage};

/// Largest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;
/// Largest accepted value, in bytes.
pub const MAX_VALUE_LEN: usize = 1 << 20;

pub struct Txn<'a> {
    tx: rusqlite::Transaction<'a>,
    table: &'a str,
}

impl Cnx {
    /// Run `f` inside one transaction: commit on Ok, roll back on Err.
    pub fn with_txn<T>(&mut self, f: impl FnOnce(&Txn) -> Result<T>) -> Result<T> {
        let txn = Txn {
            tx: self.conn.transaction()?,
            table: &self.table,
        };
        let out = f(&txn)?;
        txn.tx.commit()?;
        Ok(out)
    }
}

/// One write transaction on a pooled connection.
pub fn with_txn<T, F>(store: &Storage, f: F) -> Result<T>
where
    F: FnOnce(&Txn) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    store.apply(move |cnx| cnx.with_txn(f))
}

/// One read-only transaction on a pooled connection, without the write
/// mutex.
pub fn with_txn_read<T, F>(store: &Storage, f: F) -> Result<T>
where
    F: FnOnce(&Txn) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    store.apply_read(move |cnx| cnx.with_txn(f))
}

// Scan direction folds into one canonical half-open interval [lo, hi):
// ascending when start <= end, else the same interval walked backwards.
struct Scan<'s> {
    lo: &'s [u8],
    hi: &'s [u8],
    desc: bool,
}

impl<'s> Scan<'s> {
    fn of(start: &'s [u8], end: &'s [u8]) -> Scan<'s> {
        if start <= end {
            Scan { lo: start, hi: end, desc: false }
        } else {
            Scan { lo: end, hi: start, desc: true }
        }
    }

    fn order(&self) -> &'static str {
        if self.desc {
            "DESC"
        } else {
            "ASC"
        }
    }
}

// SQLite only accepts OFFSET after a LIMIT clause; -1 means unbounded.
// The window values are plain integers, so they go straight into the SQL
// text and the two key bounds stay the only bound parameters.
fn window_sql(offset: usize, limit: Option<usize>) -> String {
    match (limit, offset) {
        (Some(limit), 0) => format!(" LIMIT {limit}"),
        (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
        (None, 0) => String::new(),
        (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
    }
}

impl Txn<'_> {
    /// Insert-or-replace one row.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(invalid_input(format!(
                "key is {} bytes, limit is {MAX_KEY_LEN}",
                key.len()
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(invalid_input(format!(
                "value is {} bytes, limit is {MAX_VALUE_LEN}",
                value.len()
            )));
        }
        self.tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                self.table
            ),
            (key, value),
        )?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .tx
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.table),
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Delete one key. Idempotent; reports how many rows went away (0 or 1).
    pub fn delete(&self, key: &[u8]) -> Result<usize> {
        let gone = self.tx.execute(
            &format!("DELETE FROM {} WHERE key = ?1", self.table),
            [key],
        )?;
        Ok(gone)
    }

    /// Rows in [start, end) ascending, or [end, start) descending when
    /// start > end. Equal bounds select nothing. The window applies after
    /// direction ordering.
    pub fn query(
        &self,
        start: &[u8],
        end: &[u8],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let scan = Scan::of(start, end);
        let sql = format!(
            "SELECT key, value FROM {} WHERE key >= ?1 AND key < ?2 ORDER BY key {}{}",
            self.table,
            scan.order(),
            window_sql(offset, limit),
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt
            .query_map((scan.lo, scan.hi), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// How many rows the equivalent `query` would return.
    pub fn count(
        &self,
        start: &[u8],
        end: &[u8],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<u64> {
        let scan = Scan::of(start, end);
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT key FROM {} WHERE key >= ?1 AND key < ?2 ORDER BY key {}{})",
            self.table,
            scan.order(),
            window_sql(offset, limit),
        );
        let n: i64 = self.tx.query_row(&sql, (scan.lo, scan.hi), |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Total len(key) + len(value) over the rows the equivalent `query`
    /// would return.
    pub fn bytes(
        &self,
        start: &[u8],
        end: &[u8],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<u64> {
        let scan = Scan::of(start, end);
        let sql = format!(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) \
             FROM (SELECT key, value FROM {} WHERE key >= ?1 AND key < ?2 ORDER BY key {}{})",
            self.table,
            scan.order(),
            window_sql(offset, limit),
        );
        let n: i64 = self.tx.query_row(&sql, (scan.lo, scan.hi), |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Remove the rows the equivalent `query` would return; reports how
    /// many went away.
    pub fn delete_range(
        &self,
        start: &[u8],
        end: &[u8],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<usize> {
        let scan = Scan::of(start, end);
        let gone = if offset == 0 && limit.is_none() {
            self.tx.execute(
                &format!("DELETE FROM {} WHERE key >= ?1 AND key < ?2", self.table),
                (scan.lo, scan.hi),
            )?
        } else {
            // DELETE ... LIMIT needs a nonstandard SQLite build; select the
            // windowed key set instead.
            self.tx.execute(
                &format!(
                    "DELETE FROM {table} WHERE key IN \
                     (SELECT key FROM {table} WHERE key >= ?1 AND key < ?2 ORDER BY key {order}{window})",
                    table = self.table,
                    order = scan.order(),
                    window = window_sql(offset, limit),
                ),
                (scan.lo, scan.hi),
            )?
        };
        Ok(gone)
    }
}
