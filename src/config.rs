//! Process-wide engine tunables.
//!
//! All knobs are plain atomics with setter functions that return the value
//! stored, so callers can log what actually took effect. Streaming
//! eligibility consults these at load time; see `BulkData::should_stream`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;

/// Default minimum payload size, in bytes, before an inline load is handed
/// to the background fetch pool instead of being read on the spot.
pub const DEFAULT_MIN_STREAM_SIZE: i64 = 131_072;

static MIN_STREAM_SIZE: AtomicI64 = AtomicI64::new(DEFAULT_MIN_STREAM_SIZE);

/// Whether the process is running against cooked (shipping-ready, read-only)
/// data. Streaming loads happen only in cooked mode.
static COOKED_DATA: AtomicBool = AtomicBool::new(false);

/// Opt-in: mark bulk data single-use at cooked-load time so the payload is
/// released after its first unlock. Off by default.
static SINGLE_USE_ON_COOKED_LOAD: AtomicBool = AtomicBool::new(false);

/// Whether background worker threads may be used at all.
static MULTITHREADING: AtomicBool = AtomicBool::new(true);

/// The designated foreground thread, if any. Streaming dispatch is restricted
/// to this thread so fetch completion is always harvested by the same thread
/// that issued it.
static FOREGROUND_THREAD: Lazy<Mutex<Option<ThreadId>>> = Lazy::new(|| Mutex::new(None));

/// Returns the current minimum streaming size in bytes. Negative values
/// disable streaming entirely.
pub fn min_stream_size() -> i64 {
    MIN_STREAM_SIZE.load(Ordering::Relaxed)
}

/// Sets the minimum streaming size. Returns the value stored.
pub fn set_min_stream_size(bytes: i64) -> i64 {
    MIN_STREAM_SIZE.store(bytes, Ordering::Relaxed);
    bytes
}

/// Returns whether the process treats its data as cooked.
pub fn requires_cooked_data() -> bool {
    COOKED_DATA.load(Ordering::Relaxed)
}

/// Marks the process as running against cooked data. Returns the new value.
pub fn set_requires_cooked_data(cooked: bool) -> bool {
    COOKED_DATA.store(cooked, Ordering::Relaxed);
    cooked
}

/// Returns whether cooked loads mark bulk data single-use.
pub fn single_use_on_cooked_load() -> bool {
    SINGLE_USE_ON_COOKED_LOAD.load(Ordering::Relaxed)
}

/// Enables or disables the single-use-at-cooked-load optimization.
/// Returns the new value.
pub fn set_single_use_on_cooked_load(enable: bool) -> bool {
    SINGLE_USE_ON_COOKED_LOAD.store(enable, Ordering::Relaxed);
    enable
}

/// Returns whether background workers may be used.
pub fn supports_multithreading() -> bool {
    MULTITHREADING.load(Ordering::Relaxed)
}

/// Enables or disables use of background workers. Returns the new value.
pub fn set_supports_multithreading(enable: bool) -> bool {
    MULTITHREADING.store(enable, Ordering::Relaxed);
    enable
}

/// Designates the calling thread as the foreground thread. Subsequent calls
/// move the designation; there is at most one foreground thread at a time.
pub fn designate_foreground_thread() {
    *FOREGROUND_THREAD.lock().unwrap() = Some(thread::current().id());
}

/// Returns whether the calling thread is the designated foreground thread.
/// Always false until a thread has been designated.
pub fn is_foreground_thread() -> bool {
    *FOREGROUND_THREAD.lock().unwrap() == Some(thread::current().id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_stream_size_round_trips() {
        let old = min_stream_size();
        assert_eq!(set_min_stream_size(64), 64);
        assert_eq!(min_stream_size(), 64);
        set_min_stream_size(old);
    }

    #[test]
    fn foreground_designation_is_per_thread() {
        designate_foreground_thread();
        assert!(is_foreground_thread());
        let handle = thread::spawn(is_foreground_thread);
        assert!(!handle.join().unwrap());
    }
}
