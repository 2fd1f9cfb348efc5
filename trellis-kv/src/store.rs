// A process-wide pool of worker threads, each owning one SQLite connection
// in WAL mode. A single MPMC queue hands jobs to whichever worker is free,
// and every call gets its own bounded(1) reply channel. Writers serialize
// on one mutex held by the calling thread for the whole queue+reply round
// trip, so at most one write job is ever in flight; readers skip the mutex
// and fan out across idle workers.
//
// Failure split: an error inside a job travels back through the reply slot
// and leaves the connection alone, unless it is Substrate-kind (or the job
// panicked), in which case the worker assumes the connection is suspect,
// drops it, and reopens on the next job.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, warn};
use trellis_base::{invalid_input, substrate, ErrorKind, Result};

pub(crate) type Job = Box<dyn FnOnce(&mut Cnx) -> Option<ErrorKind> + Send + 'static>;

pub const DEFAULT_TABLE: &str = "kv";

const POOL_SIZE_MIN: usize = 4;

/// Twice the logical CPU count, floor 4.
pub fn pool_size_default() -> usize {
    POOL_SIZE_MIN.max(2 * num_cpus::get())
}

/// One open database: the path and table every connection uses, the job
/// queue, the worker threads, and the process-wide write mutex.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    table: String,
    pool_size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    write_lock: Mutex<()>,
}

/// One worker's live connection, handed to jobs by mutable borrow.
pub struct Cnx {
    pub(crate) conn: Connection,
    pub(crate) table: String,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Storage> {
        Storage::open_with(path, None, None)
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        pool_size: Option<usize>,
        table: Option<&str>,
    ) -> Result<Storage> {
        let path = path.as_ref().to_path_buf();
        let table = table.unwrap_or(DEFAULT_TABLE).to_string();
        check_table_name(&table)?;
        let pool_size = pool_size.unwrap_or_else(pool_size_default).max(1);

        // Bootstrap connection: the table must exist before any worker
        // takes a job.
        let boot = open_connection(&path)?;
        boot.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (key BLOB PRIMARY KEY, value BLOB NOT NULL)"
        ))?;
        drop(boot);

        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(pool_size);
        for worker in 0..pool_size {
            let path = path.clone();
            let table = table.clone();
            let receiver = receiver.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("trellis-worker-{worker}"))
                    .spawn(move || run_worker(worker, path, table, receiver))?,
            );
        }
        debug!(target: "trellis", pool_size, "storage open");

        Ok(Storage {
            path,
            table,
            pool_size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            write_lock: Mutex::new(()),
        })
    }

    /// Run `f` on a pooled connection with the write mutex held by this
    /// thread until the reply lands. Writes are totally ordered by the
    /// sequence of mutex acquisitions.
    pub fn apply<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Cnx) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _serial = self.write_lock.lock();
        self.submit(f)
    }

    /// Run `f` on a pooled connection without taking the write mutex.
    /// Reads across separate calls have no mutual ordering.
    pub fn apply_read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Cnx) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(f)
    }

    fn submit<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Cnx) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, slot) = bounded(1);
        let job: Job = Box::new(move |cnx| {
            let out = f(cnx);
            let kind = out.as_ref().err().map(|e| e.kind());
            // A caller that stopped waiting just discards the reply.
            let _ = reply.send(out);
            kind
        });
        {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(sender) => sender
                    .send(job)
                    .map_err(|_| substrate("worker pool is shut down"))?,
                None => return Err(substrate("worker pool is shut down")),
            }
        }
        match slot.recv() {
            Ok(out) => out,
            Err(_) => Err(substrate("worker dropped the reply slot")),
        }
    }

    /// Best-effort shutdown: close the queue and join the workers. Pending
    /// jobs still drain first. Skipping this is safe; WAL recovery covers
    /// a process that just exits.
    pub fn close(&self) {
        let sender = self.sender.lock().take();
        drop(sender);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

fn check_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(invalid_input(format!("invalid table name: {table:?}")))
    }
}

fn run_worker(worker: usize, path: PathBuf, table: String, queue: Receiver<Job>) {
    let mut cnx: Option<Cnx> = None;
    while let Ok(job) = queue.recv() {
        if cnx.is_none() {
            match open_connection(&path) {
                Ok(conn) => {
                    cnx = Some(Cnx {
                        conn,
                        table: table.clone(),
                    })
                }
                Err(err) => {
                    warn!(target: "trellis", worker, ?err, "worker cannot open connection");
                    // Dropping the job drops its reply sender; the caller
                    // sees a substrate error.
                    continue;
                }
            }
        }
        let Some(live) = cnx.as_mut() else { continue };
        match catch_unwind(AssertUnwindSafe(|| job(live))) {
            Ok(Some(ErrorKind::Substrate)) | Err(_) => {
                warn!(target: "trellis", worker, "discarding worker connection");
                cnx = None;
            }
            Ok(_) => {}
        }
    }
    debug!(target: "trellis", worker, "worker exit");
}
