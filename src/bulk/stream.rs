//! Background payload fetch.
//!
//! Sufficiently large payloads are read off the foreground thread by a
//! shared pool of fetch workers. A dispatched fetch snapshots everything it
//! needs (path, offset, codec, destination geometry); completion comes back
//! through a one-shot bounded channel that doubles as the future: probing
//! is non-blocking, harvesting receives exactly once, and the slot holding
//! the handle is cleared afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::warn;
use once_cell::sync::Lazy;
use rayon::ThreadPool as RayonPool;

use crate::archive::{Archive, FileReaderArchive};
use crate::buffer::PayloadBuffer;
use crate::bulk::codec::PayloadCodec;
use crate::error::Result;

/// One fetch worker per core beyond a small reserve, minimum one.
fn default_fetch_workers() -> usize {
    let cores = num_cpus::get();
    let spared = 1 + (cores >> 3);
    cores.saturating_sub(spared).max(1)
}

/// Shared fetch pool, created on first use.
static FETCH_POOL: Lazy<FetchPool> =
    Lazy::new(|| FetchPool::new(default_fetch_workers()).expect("failed to build fetch pool"));

/// Everything a fetch needs, captured at dispatch. The owning instance must
/// not mutate its filename or offset until the fetch is harvested.
pub(crate) struct FetchRequest {
    pub path: PathBuf,
    pub offset: i64,
    pub total_size: usize,
    pub alignment: usize,
    pub codec: PayloadCodec,
    /// Pre-allocated externally-owned destination, when the resource
    /// allocator provided one; otherwise the worker allocates.
    pub preallocated: Option<PayloadBuffer>,
}

/// One-shot completion handle for a dispatched fetch.
pub(crate) struct FetchHandle {
    rx: Receiver<Result<PayloadBuffer>>,
    path: PathBuf,
}

impl FetchHandle {
    /// Non-blocking completion probe. Never consumes the result.
    pub fn is_complete(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Blocks until the fetch finishes, logging a warning for every full
    /// second spent waiting. A failed fetch is fatal: cooked content is
    /// expected to be complete, and zero-filling would corrupt consumers.
    pub fn wait(self) -> PayloadBuffer {
        match self.wait_inner() {
            Ok(buffer) => buffer,
            Err(err) => panic!(
                "failed to load bulk data from '{}': {}",
                self.path.display(),
                err
            ),
        }
    }

    /// Like [`wait`](Self::wait) but merely logs on failure; used during
    /// teardown where trapping would tear down the process twice.
    pub fn drain(self) {
        if let Err(err) = self.wait_inner() {
            warn!(
                "discarding failed bulk data fetch for '{}': {}",
                self.path.display(),
                err
            );
        }
    }

    fn wait_inner(&self) -> Result<PayloadBuffer> {
        loop {
            match self.rx.recv_timeout(Duration::from_secs(1)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "waiting for bulk data '{}' to load longer than 1000ms",
                        self.path.display()
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    panic!(
                        "bulk data fetch worker for '{}' terminated without a result",
                        self.path.display()
                    );
                }
            }
        }
    }
}

/// Dispatches `request` onto the shared pool, returning its handle.
pub(crate) fn dispatch_fetch(request: FetchRequest) -> FetchHandle {
    FETCH_POOL.dispatch(request)
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

/// Fixed-size fetch pool. The bounded slot channel acts as a semaphore:
/// submission blocks once two requests per worker are in flight, so a flood
/// of streaming loads backpressures the loader instead of queueing
/// unboundedly.
struct FetchPool {
    pool: RayonPool,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
}

impl FetchPool {
    fn new(workers: usize) -> Option<FetchPool> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build().ok()?;
        let capacity = workers * 3;
        let (slot_tx, slot_rx) = bounded(capacity);
        // Tokens represent free slots; submitters take one, workers return it.
        for _ in 0..capacity {
            slot_tx.send(()).ok()?;
        }
        Some(FetchPool { pool, slot_tx, slot_rx })
    }

    fn dispatch(&self, request: FetchRequest) -> FetchHandle {
        self.slot_rx.recv().expect("fetch pool slot channel closed");

        let path = request.path.clone();
        let (tx, rx) = bounded(1);
        let slot_tx = self.slot_tx.clone();
        self.pool.spawn_fifo(move || {
            let result = run_fetch(request);
            let _ = tx.send(result);
            let _ = slot_tx.send(());
        });
        FetchHandle { rx, path }
    }
}

/// The body of a fetch task: acquire a destination, open the recorded file
/// silently, seek to the payload, run the codec, report.
fn run_fetch(request: FetchRequest) -> Result<PayloadBuffer> {
    let mut buffer = match request.preallocated {
        Some(buffer) => buffer,
        None => PayloadBuffer::alloc(request.total_size, request.alignment),
    };
    let mut ar = FileReaderArchive::open(&request.path, true)?;
    ar.seek(request.offset)?;
    request.codec.serialize(&mut ar, buffer.as_mut_slice())?;
    Ok(buffer)
}
