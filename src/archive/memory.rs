//! Growable in-memory archive over a shared byte store.
//!
//! A [`MemoryArchive`] writer and any number of readers can share one
//! store, which is what makes bulk data attachment work: the instance keeps
//! a weak [`ArchiveBacking`] handle and opens a fresh reader over the same
//! bytes when it needs to page its payload back in. Dropping the last
//! archive over a store invalidates every outstanding handle, so teardown
//! detaches all instances without the archive having to walk them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::archive::Archive;
use crate::error::{ArchiveError, Result};

/// In-memory archive; both the writer and reader sides of one store.
pub struct MemoryArchive {
    store: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    loading: bool,
    swap: bool,
    transacting: bool,
    cooking: bool,
    lazy_loading: bool,
    filename: Option<PathBuf>,
    attach_count: Arc<AtomicUsize>,
}

impl MemoryArchive {
    /// Creates an empty saving archive.
    pub fn writer() -> MemoryArchive {
        MemoryArchive {
            store: Arc::new(Mutex::new(Vec::new())),
            pos: 0,
            loading: false,
            swap: false,
            transacting: false,
            cooking: false,
            lazy_loading: false,
            filename: None,
            attach_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a loading archive over `bytes`.
    pub fn reader(bytes: Vec<u8>) -> MemoryArchive {
        MemoryArchive {
            store: Arc::new(Mutex::new(bytes)),
            pos: 0,
            loading: true,
            swap: false,
            transacting: false,
            cooking: false,
            lazy_loading: false,
            filename: None,
            attach_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Turns this archive into a loading archive over the same store,
    /// rewound to the start. Mode flags carry over.
    pub fn into_reader(self) -> MemoryArchive {
        MemoryArchive { pos: 0, loading: true, ..self }
    }

    /// Opens an additional loading archive over the same store with its own
    /// cursor. The attachment counter is shared.
    pub fn share_reader(&self) -> MemoryArchive {
        MemoryArchive {
            store: Arc::clone(&self.store),
            pos: 0,
            loading: true,
            swap: self.swap,
            transacting: self.transacting,
            cooking: self.cooking,
            lazy_loading: self.lazy_loading,
            filename: self.filename.clone(),
            attach_count: Arc::clone(&self.attach_count),
        }
    }

    pub fn set_force_byte_swapping(&mut self, swap: bool) {
        self.swap = swap;
    }

    pub fn set_transacting(&mut self, transacting: bool) {
        self.transacting = transacting;
    }

    pub fn set_cooking(&mut self, cooking: bool) {
        self.cooking = cooking;
    }

    pub fn set_lazy_loading(&mut self, lazy: bool) {
        self.lazy_loading = lazy;
    }

    /// Associates a filename with the archive, as a file-backed loader
    /// would. Bulk data records it for filename-based reload.
    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) {
        self.filename = Some(filename.into());
    }

    /// Number of bytes currently in the store.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the store contents.
    pub fn bytes(&self) -> Vec<u8> {
        self.store.lock().unwrap().clone()
    }

    /// Number of bulk data instances currently attached to this store.
    pub fn attached_count(&self) -> usize {
        self.attach_count.load(Ordering::Relaxed)
    }
}

impl Archive for MemoryArchive {
    fn is_loading(&self) -> bool {
        self.loading
    }

    fn is_transacting(&self) -> bool {
        self.transacting
    }

    fn is_cooking(&self) -> bool {
        self.cooking
    }

    fn allows_lazy_loading(&self) -> bool {
        self.lazy_loading
    }

    fn force_byte_swapping(&self) -> bool {
        self.swap
    }

    fn tell(&self) -> i64 {
        self.pos as i64
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 {
            return Err(ArchiveError::Corrupt(format!("seek to negative offset {}", pos)));
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn serialize(&mut self, data: &mut [u8]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        if self.loading {
            let end = self.pos.checked_add(data.len()).ok_or(ArchiveError::UnexpectedEof)?;
            if end > store.len() {
                return Err(ArchiveError::UnexpectedEof);
            }
            data.copy_from_slice(&store[self.pos..end]);
            self.pos = end;
        } else {
            let end = self.pos + data.len();
            if end > store.len() {
                store.resize(end, 0);
            }
            store[self.pos..end].copy_from_slice(data);
            self.pos = end;
        }
        Ok(())
    }

    fn backing(&self) -> Option<ArchiveBacking> {
        self.attach_count.fetch_add(1, Ordering::Relaxed);
        Some(ArchiveBacking {
            store: Arc::downgrade(&self.store),
            attach_count: Arc::clone(&self.attach_count),
            swap: self.swap,
        })
    }

    fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }
}

/// Non-owning attachment handle from a bulk data instance back to the
/// archive it was loaded from.
///
/// The handle counts as one live attachment until dropped; detaching is
/// simply dropping it. When every archive over the store is gone the handle
/// stops resolving, which is the teardown notification.
pub struct ArchiveBacking {
    store: Weak<Mutex<Vec<u8>>>,
    attach_count: Arc<AtomicUsize>,
    swap: bool,
}

impl ArchiveBacking {
    /// Whether the source archive still exists.
    pub fn is_alive(&self) -> bool {
        self.store.strong_count() > 0
    }

    /// Opens a loading archive over the attached store with a fresh cursor,
    /// or `None` when the source archive is gone.
    pub fn open_reader(&self) -> Option<MemoryArchive> {
        let store = self.store.upgrade()?;
        Some(MemoryArchive {
            store,
            pos: 0,
            loading: true,
            swap: self.swap,
            transacting: false,
            cooking: false,
            lazy_loading: false,
            filename: None,
            attach_count: Arc::clone(&self.attach_count),
        })
    }
}

impl Drop for ArchiveBacking {
    fn drop(&mut self) {
        self.attach_count.fetch_sub(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ArchiveBacking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBacking")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_overwrites_in_place_on_seek_back() {
        let mut ar = MemoryArchive::writer();
        ar.serialize(&mut [1, 2, 3, 4]).unwrap();
        ar.seek(1).unwrap();
        ar.serialize(&mut [9]).unwrap();
        ar.seek(4).unwrap();
        ar.serialize(&mut [5]).unwrap();
        assert_eq!(ar.bytes(), vec![1, 9, 3, 4, 5]);
    }

    #[test]
    fn reader_hits_eof_past_store_end() {
        let mut ar = MemoryArchive::reader(vec![1, 2]);
        let mut buf = [0u8; 4];
        assert!(matches!(ar.serialize(&mut buf), Err(ArchiveError::UnexpectedEof)));
    }

    #[test]
    fn attach_detach_counting() {
        let ar = MemoryArchive::reader(vec![0; 8]);
        assert_eq!(ar.attached_count(), 0);
        let backing = ar.backing().unwrap();
        assert_eq!(ar.attached_count(), 1);
        assert!(backing.is_alive());
        drop(backing);
        assert_eq!(ar.attached_count(), 0);
    }

    #[test]
    fn backing_dies_with_its_archive() {
        let ar = MemoryArchive::reader(vec![0; 8]);
        let backing = ar.backing().unwrap();
        drop(ar);
        assert!(!backing.is_alive());
        assert!(backing.open_reader().is_none());
    }

    #[test]
    fn backing_reader_sees_the_same_bytes() {
        let mut writer = MemoryArchive::writer();
        writer.serialize(&mut [10, 20, 30]).unwrap();
        let reader = writer.into_reader();
        let backing = reader.backing().unwrap();
        let mut view = backing.open_reader().unwrap();
        let mut buf = [0u8; 3];
        view.serialize(&mut buf).unwrap();
        assert_eq!(buf, [10, 20, 30]);
    }
}
