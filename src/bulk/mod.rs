//! The bulk data instance: a logically-sized array of fixed-width elements
//! whose in-memory presence is decoupled from its owner's lifetime.
//!
//! A payload can live on disk at a recorded offset and be paged in on first
//! access, copied out on demand, resized under a read-write lock, written
//! back during a save pass, or discarded without ever being loaded. Four
//! lifecycle states: detached (no backing), archive-attached (reloadable),
//! in-memory (resident), and async-loading (fetch in flight).
//!
//! Access to one instance is caller-serialized; the lock state machine
//! guards against misuse, not against concurrency.

pub(crate) mod codec;
pub mod serialize;
pub(crate) mod stream;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::archive::{Archive, ArchiveBacking};
use crate::buffer::{PayloadBuffer, DEFAULT_ALIGNMENT};
use crate::bulk::codec::PayloadCodec;
use crate::bulk::stream::FetchHandle;
use crate::config;
use crate::element::ElementType;
use crate::flags::{BulkDataFlags, CompressionFlags, LockFlags, LockStatus};
use crate::tracking;

pub use serialize::{ResourceMemoryProvider, SerializeContext};

/// Sentinel for "no backing" in `size_on_disk` and `offset_in_file`.
const INDEX_NONE: i64 = -1;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A lazily-loaded, optionally compressed byte payload attached to a
/// containing persisted object.
pub struct BulkData {
    id: u64,
    flags: BulkDataFlags,
    element: ElementType,
    element_count: i32,
    alignment: usize,
    size_on_disk: i32,
    offset_in_file: i64,
    payload: Option<PayloadBuffer>,
    lock_status: LockStatus,
    attachment: Option<ArchiveBacking>,
    filename: Option<PathBuf>,
    pending_fetch: Option<FetchHandle>,
}

impl BulkData {
    /// Creates an empty instance over `element`-typed data.
    pub fn with_element(element: ElementType) -> BulkData {
        BulkData {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            flags: BulkDataFlags::empty(),
            element,
            element_count: 0,
            alignment: DEFAULT_ALIGNMENT,
            size_on_disk: INDEX_NONE as i32,
            offset_in_file: INDEX_NONE,
            payload: None,
            lock_status: LockStatus::Unlocked,
            attachment: None,
            filename: None,
            pending_fetch: None,
        }
    }

    /// Empty byte bulk data.
    pub fn byte() -> BulkData {
        BulkData::with_element(ElementType::byte())
    }

    /// Empty 16-bit-word bulk data.
    pub fn word() -> BulkData {
        BulkData::with_element(ElementType::word())
    }

    /// Empty 32-bit-integer bulk data.
    pub fn int32() -> BulkData {
        BulkData::with_element(ElementType::int32())
    }

    /// Empty 32-bit-float bulk data.
    pub fn float32() -> BulkData {
        BulkData::with_element(ElementType::float32())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Number of elements in the payload.
    pub fn element_count(&self) -> i32 {
        self.element_count
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        self.element.size()
    }

    /// Logical payload size in bytes (`element_count * element_size`).
    pub fn size(&self) -> usize {
        self.element_count as usize * self.element.size()
    }

    /// Bytes the payload occupies in its backing archive. Differs from
    /// [`size`](Self::size) only when stored compressed; −1 when unbacked.
    pub fn size_on_disk(&self) -> i32 {
        self.size_on_disk
    }

    /// Absolute archive offset of the payload, or −1 when unbacked.
    pub fn offset_in_file(&self) -> i64 {
        self.offset_in_file
    }

    pub fn flags(&self) -> BulkDataFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: BulkDataFlags) {
        self.flags |= flags;
    }

    pub fn clear_flags(&mut self, flags: BulkDataFlags) {
        self.flags &= !flags;
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Sets the allocation alignment used for future payload allocations.
    pub fn set_alignment(&mut self, alignment: usize) {
        self.alignment = alignment;
    }

    /// Whether the payload is stored compressed on disk.
    pub fn is_stored_compressed_on_disk(&self) -> bool {
        self.flags.intersects(BulkDataFlags::SERIALIZE_COMPRESSED)
    }

    /// Codec selector for decompressing the on-disk payload.
    pub fn decompression_flags(&self) -> CompressionFlags {
        self.flags.compression()
    }

    /// Whether the payload is resident in memory. A fetch in flight does
    /// not count until harvested.
    pub fn is_loaded(&self) -> bool {
        self.payload.is_some()
    }

    /// Whether the instance carries payload data at all (`UNUSED` unset).
    pub fn is_available_for_use(&self) -> bool {
        !self.flags.contains(BulkDataFlags::UNUSED)
    }

    /// Whether a non-resident payload can still be paged back in.
    pub fn can_load_from_disk(&self) -> bool {
        self.attachment.as_ref().is_some_and(ArchiveBacking::is_alive)
            || self.filename.is_some()
    }

    /// Whether the instance currently holds an archive attachment.
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Current lock state.
    pub fn lock_status(&self) -> LockStatus {
        self.lock_status
    }

    /// Non-blocking probe: true when no fetch is in flight or the in-flight
    /// fetch has finished (but has not yet been harvested).
    pub fn is_async_loading_complete(&self) -> bool {
        match &self.pending_fetch {
            None => true,
            Some(handle) => handle.is_complete(),
        }
    }

    // ------------------------------------------------------------------
    // Lock state machine
    // ------------------------------------------------------------------

    /// Locks the payload and returns it. Ensures residency first, waiting
    /// out any in-flight fetch.
    ///
    /// A read-write lock detaches the instance from its source archive so
    /// a later reload cannot write through freshly mutated bytes. Locking
    /// an already-locked instance, or passing flags that request neither
    /// access mode, traps.
    pub fn lock(&mut self, flags: LockFlags) -> &mut [u8] {
        assert_eq!(
            self.lock_status,
            LockStatus::Unlocked,
            "lock requested while already locked"
        );
        self.make_sure_loaded();

        if flags.contains(LockFlags::READ_WRITE) {
            self.lock_status = LockStatus::ReadWrite;
            self.detach_from_archive();
        } else if flags.contains(LockFlags::READ_ONLY) {
            self.lock_status = LockStatus::ReadOnly;
        } else {
            panic!("unknown lock flags {:?}", flags);
        }

        self.payload.as_mut().expect("payload resident after load").as_mut_slice()
    }

    /// Read-only lock. Does not detach from the source archive.
    pub fn lock_read_only(&mut self) -> &[u8] {
        assert_eq!(
            self.lock_status,
            LockStatus::Unlocked,
            "lock requested while already locked"
        );
        self.make_sure_loaded();
        self.lock_status = LockStatus::ReadOnly;
        self.payload.as_ref().expect("payload resident after load").as_slice()
    }

    /// Resizes the payload to `element_count` elements. Valid only under a
    /// read-write lock and only for engine-owned payload memory.
    pub fn realloc(&mut self, element_count: i32) -> &mut [u8] {
        assert_eq!(
            self.lock_status,
            LockStatus::ReadWrite,
            "realloc requires a read-write lock"
        );
        assert!(element_count >= 0, "negative element count {}", element_count);
        self.element_count = element_count;
        let new_size = self.size();
        self.payload
            .as_mut()
            .expect("payload resident under lock")
            .realloc(new_size);
        self.sync_tracking();
        self.payload.as_mut().unwrap().as_mut_slice()
    }

    /// Releases the lock. Pointers obtained from `lock` are invalid after
    /// this returns. Single-use payloads are released here; unlocking an
    /// unlocked instance traps.
    pub fn unlock(&mut self) {
        assert_ne!(
            self.lock_status,
            LockStatus::Unlocked,
            "unlock requested while not locked"
        );
        self.lock_status = LockStatus::Unlocked;

        // One-shot upload pattern: no CPU-side copy is retained.
        if self.flags.contains(BulkDataFlags::SINGLE_USE) {
            self.payload = None;
            self.sync_tracking();
        }
    }

    // ------------------------------------------------------------------
    // Residency and teardown
    // ------------------------------------------------------------------

    /// Clears the payload and resets the element count to zero.
    pub fn remove(&mut self) {
        assert_eq!(
            self.lock_status,
            LockStatus::Unlocked,
            "remove requested while locked"
        );
        // A fetch still in flight would otherwise be harvested later into
        // an instance that no longer has the geometry it was issued for.
        if let Some(handle) = self.pending_fetch.take() {
            handle.drain();
        }
        self.detach_from_archive();
        self.element_count = 0;
        self.payload = None;
        self.sync_tracking();
    }

    /// Forces the payload resident and detaches from the source archive.
    pub fn force_resident(&mut self) {
        self.make_sure_loaded();
        self.detach_from_archive();
    }

    /// Switches the on-disk compression mode.
    ///
    /// The payload is forced resident first so a pending lazy load cannot
    /// later be decoded under the wrong codec. Enabling compression clears
    /// `FORCE_INLINE_PAYLOAD`; the two are mutually exclusive.
    pub fn store_compressed_on_disk(&mut self, compression: CompressionFlags) {
        if compression == self.decompression_flags() {
            return;
        }
        self.force_resident();
        match compression {
            CompressionFlags::None => {
                self.flags.remove(BulkDataFlags::SERIALIZE_COMPRESSED);
            }
            CompressionFlags::Zlib => {
                self.flags.insert(BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB);
                self.flags.remove(BulkDataFlags::FORCE_INLINE_PAYLOAD);
            }
        }
    }

    /// Retrieves a copy of the payload.
    ///
    /// With `Some(buffer)` in `dest`, bytes are copied into the existing
    /// buffer; with `None`, a buffer is produced, by moving the internal
    /// one out when `discard_internal` is set and the payload can still be
    /// reloaded (or is single-use anyway), otherwise by allocation. A
    /// non-resident payload is loaded straight into the destination.
    pub fn get_copy(&mut self, dest: &mut Option<PayloadBuffer>, discard_internal: bool) {
        assert_eq!(
            self.lock_status,
            LockStatus::Unlocked,
            "get_copy requested while locked"
        );
        let size = self.size();
        let discardable = |bulk: &BulkData| {
            bulk.can_load_from_disk() || bulk.flags.contains(BulkDataFlags::SINGLE_USE)
        };

        match dest {
            Some(buffer) => {
                assert!(
                    buffer.len() >= size,
                    "destination buffer of {} bytes cannot hold {} payload bytes",
                    buffer.len(),
                    size
                );
                if self.payload.is_some() {
                    let payload = self.payload.as_ref().unwrap();
                    buffer.as_mut_slice()[..size].copy_from_slice(payload.as_slice());
                    if discard_internal && discardable(self) {
                        self.payload = None;
                        self.sync_tracking();
                    }
                } else {
                    self.load_payload_into(&mut buffer.as_mut_slice()[..size]);
                }
            }
            None => {
                // Harvest a pending fetch before deciding how to hand back.
                if self.payload.is_none() {
                    if let Some(handle) = self.pending_fetch.take() {
                        self.payload = Some(handle.wait());
                        self.sync_tracking();
                    }
                }
                if self.payload.is_some() {
                    if discard_internal && discardable(self) {
                        *dest = self.payload.take();
                        self.sync_tracking();
                    } else {
                        let mut out = PayloadBuffer::alloc(size, self.alignment);
                        out.as_mut_slice()
                            .copy_from_slice(self.payload.as_ref().unwrap().as_slice());
                        *dest = Some(out);
                    }
                } else {
                    let mut out = PayloadBuffer::alloc(size, self.alignment);
                    if size > 0 {
                        self.load_payload_into(out.as_mut_slice());
                    }
                    *dest = Some(out);
                }
            }
        }
    }

    /// Replaces this instance's contents with a copy of `other`'s payload,
    /// element typing and alignment. `other` must be resident unless empty.
    pub fn copy_from(&mut self, other: &BulkData) {
        // Drop our payload first so the read-write lock below cannot
        // trigger a pointless reload.
        self.remove();
        self.alignment = other.alignment;
        self.element = other.element;

        self.lock(LockFlags::READ_WRITE);
        self.realloc(other.element_count);
        if other.element_count > 0 {
            let src = other
                .payload
                .as_ref()
                .expect("source bulk data must be resident to copy from");
            self.payload
                .as_mut()
                .unwrap()
                .as_mut_slice()
                .copy_from_slice(src.as_slice());
        }
        self.unlock();
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    pub(crate) fn codec(&self) -> PayloadCodec {
        PayloadCodec {
            flags: self.flags,
            element: self.element,
            element_count: self.element_count,
        }
    }

    /// Streaming eligibility for an inline load.
    fn should_stream(&self) -> bool {
        let force = self.flags.contains(BulkDataFlags::FORCE_STREAM_PAYLOAD);
        let threshold = config::min_stream_size();
        config::requires_cooked_data()
            && self.filename.is_some()
            && config::supports_multithreading()
            && config::is_foreground_thread()
            && (force || self.size() as i64 > threshold)
            && threshold >= 0
    }

    /// Drops the archive attachment, if any. The backing handle's drop is
    /// what notifies the archive side.
    fn detach_from_archive(&mut self) {
        self.attachment = None;
    }

    /// Ensures the payload is resident: harvests an in-flight fetch, or
    /// allocates and loads from the attached archive / recorded filename.
    /// Load failures are fatal; cooked content is expected to be complete.
    fn make_sure_loaded(&mut self) {
        if self.payload.is_some() {
            return;
        }
        if let Some(handle) = self.pending_fetch.take() {
            self.payload = Some(handle.wait());
        } else {
            let size = self.size();
            let mut buffer = PayloadBuffer::alloc(size, self.alignment);
            if size > 0 {
                self.load_payload_into(buffer.as_mut_slice());
            }
            self.payload = Some(buffer);
        }
        self.sync_tracking();
    }

    /// If a fetch is in flight, waits for it, copies the fetched bytes into
    /// `dest`, and reports that the destination is filled.
    fn flush_async_to(&mut self, dest: &mut [u8]) -> bool {
        match self.pending_fetch.take() {
            Some(handle) => {
                let fetched = handle.wait();
                dest.copy_from_slice(fetched.as_slice());
                true
            }
            None => false,
        }
    }

    /// Loads the payload from its backing store into `dest`.
    fn load_payload_into(&mut self, dest: &mut [u8]) {
        if self.flush_async_to(dest) {
            return;
        }

        let codec = self.codec();
        let offset = self.offset_in_file;

        if let Some(attachment) = &self.attachment {
            if let Some(mut ar) = attachment.open_reader() {
                ar.seek(offset)
                    .and_then(|_| codec.serialize(&mut ar, dest))
                    .unwrap_or_else(|err| {
                        panic!("failed to load bulk data from attached archive: {}", err)
                    });
                return;
            }
            // Archive torn down since attach; fall through to the filename.
        }

        let path = self
            .filename
            .clone()
            .unwrap_or_else(|| {
                panic!("attempted to load bulk data with neither an attached archive nor a filename")
            });
        let mut ar = crate::archive::FileReaderArchive::open(&path, true).unwrap_or_else(|_| {
            panic!("attempted to load bulk data from an invalid filename '{}'", path.display())
        });
        ar.seek(offset)
            .and_then(|_| codec.serialize(&mut ar, dest))
            .unwrap_or_else(|err| {
                panic!("failed to load bulk data from '{}': {}", path.display(), err)
            });
    }

    fn sync_tracking(&self) {
        tracking::update(self.id, self.size(), self.payload.is_some());
    }
}

impl Default for BulkData {
    fn default() -> Self {
        BulkData::byte()
    }
}

impl Clone for BulkData {
    /// Clones typing, flags, alignment and payload bytes. Lock state,
    /// archive attachment and any in-flight fetch do not carry over; the
    /// source must be resident unless it is empty.
    fn clone(&self) -> Self {
        let mut out = BulkData::with_element(self.element);
        out.alignment = self.alignment;
        out.flags = self.flags;
        out.element_count = self.element_count;
        if self.element_count > 0 {
            let src = self
                .payload
                .as_ref()
                .expect("cloned bulk data must be resident");
            let mut buffer = PayloadBuffer::alloc(self.size(), self.alignment);
            buffer.as_mut_slice().copy_from_slice(src.as_slice());
            out.payload = Some(buffer);
        }
        out
    }
}

impl Drop for BulkData {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert_eq!(
                self.lock_status,
                LockStatus::Unlocked,
                "bulk data destroyed while locked"
            );
        }
        // A fetch snapshot still references our buffer geometry; it must
        // land before the instance goes away.
        if let Some(handle) = self.pending_fetch.take() {
            handle.drain();
        }
        self.detach_from_archive();
        tracking::unregister(self.id);
    }
}

impl std::fmt::Debug for BulkData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkData")
            .field("element", &self.element)
            .field("element_count", &self.element_count)
            .field("flags", &self.flags)
            .field("size_on_disk", &self.size_on_disk)
            .field("offset_in_file", &self.offset_in_file)
            .field("loaded", &self.is_loaded())
            .field("lock_status", &self.lock_status)
            .finish()
    }
}
