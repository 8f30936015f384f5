//! Bulk data load/save protocol.
//!
//! The persistent header is four fields in archive byte order: u32 flags,
//! i32 element count, i32 size-on-disk, i64 offset-in-file. Saving is
//! two-phase: placeholders go out with the header, the payload is emitted
//! (inline, or deferred to the linker's appended region), and the three
//! mutable fields are backpatched. Loading picks one of three paths per
//! policy: stream in the background, read inline on the spot, or seek out
//! to an end-of-file payload — and under a lazy-loading archive, an
//! end-of-file payload is not read at all until first access.

use std::path::Path;

use crate::archive::Archive;
use crate::buffer::PayloadBuffer;
use crate::bulk::stream::{self, FetchRequest};
use crate::bulk::BulkData;
use crate::config;
use crate::error::Result;
use crate::flags::{BulkDataFlags, CompressionFlags, LockStatus};
use crate::linker::{DeferredPayload, LinkerLoad, LinkerSave};
use crate::tracking::{self, OwnerTag};

/// Optional hook supplying pre-allocated, externally-owned payload memory
/// (e.g. GPU-visible staging buffers). Returning `None` falls back to
/// engine allocation.
pub trait ResourceMemoryProvider {
    fn resource_memory(&self, owner: Option<&OwnerTag>, index: u32) -> Option<PayloadBuffer>;
}

/// Per-call collaborator bundle for [`BulkData::serialize`].
///
/// Everything is optional; a default context serializes inline with engine
/// allocation and no tracking registration.
#[derive(Default)]
pub struct SerializeContext<'a> {
    /// Owning object, registered with the usage-tracking table when set.
    pub owner: Option<OwnerTag>,
    /// Index of this instance among the owner's bulk data, passed to the
    /// resource-memory hook.
    pub index: u32,
    /// True while the owner itself is still mid-load; a transacting save
    /// must not force the payload resident then.
    pub owner_needs_load: bool,
    /// Parent package policy: compress payloads on disk.
    pub store_compressed: bool,
    pub resource_memory: Option<&'a dyn ResourceMemoryProvider>,
    /// Save-side linker; enables end-of-file payload placement.
    pub linker_save: Option<&'a mut LinkerSave>,
    /// Load-side linker: offset base for end-of-file payloads plus the
    /// filename payloads can be re-read from.
    pub linker_load: Option<&'a LinkerLoad>,
}

impl BulkData {
    /// Serializes the header and payload through `ar`.
    ///
    /// On a loading archive this deserializes into `self`; on a saving
    /// archive it writes `self` out, forcing the payload resident first.
    /// Transacting archives use the separate guarded layout and never take
    /// a lazy path.
    pub fn serialize(&mut self, ar: &mut dyn Archive, ctx: &mut SerializeContext<'_>) -> Result<()> {
        assert_eq!(
            self.lock_status,
            LockStatus::Unlocked,
            "serialize requested while locked"
        );

        if ar.is_transacting() {
            return self.serialize_transacting(ar, ctx);
        }

        if let Some(owner) = &ctx.owner {
            tracking::register(self.id, owner.clone(), self.size(), self.payload.is_some());
        }

        let flags_pos = ar.tell();
        let mut flag_bits = self.flags.bits();
        ar.serialize_u32(&mut flag_bits)?;
        if ar.is_loading() {
            // The single-element knob is a property of the loading side
            // (backward-compatible element decoding); it is never on disk,
            // so a caller-set knob survives the header read.
            let knob = self.flags & BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION;
            self.flags = BulkDataFlags::from_bits_retain(flag_bits) | knob;
        }
        ar.serialize_i32(&mut self.element_count)?;

        if ar.is_loading() {
            self.load_payload(ar, ctx)
        } else {
            self.save_payload(ar, ctx, flags_pos)
        }
    }

    /// Undo/redo buffers carry a guard word, then flags, count and the raw
    /// payload. No placeholders, no lazy path, no streaming.
    fn serialize_transacting(
        &mut self,
        ar: &mut dyn Archive,
        ctx: &mut SerializeContext<'_>,
    ) -> Result<()> {
        // Constructing an object during load records it to the transaction
        // buffer; forcing its payload resident at that point would load
        // data that is not there yet. The guard round-trips so the matching
        // restore knows whether payload bytes follow.
        let mut actually_save = ar.is_saving() && !ctx.owner_needs_load;
        ar.serialize_bool(&mut actually_save)?;
        if !actually_save {
            return Ok(());
        }

        let mut flag_bits = self.flags.bits();
        ar.serialize_u32(&mut flag_bits)?;
        if ar.is_loading() {
            let knob = self.flags & BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION;
            self.flags = BulkDataFlags::from_bits_retain(flag_bits) | knob;
        }
        ar.serialize_i32(&mut self.element_count)?;

        if ar.is_loading() {
            let size = self.size();
            let mut buffer = self
                .payload
                .take()
                .unwrap_or_else(|| PayloadBuffer::alloc(0, self.alignment));
            assert!(
                buffer.owns_memory(),
                "transacting load into an externally-owned payload"
            );
            buffer.realloc(size);
            self.codec().serialize(ar, buffer.as_mut_slice())?;
            self.payload = Some(buffer);
            self.sync_tracking();
        } else if self.size() > 0 {
            // Zero-size saves skip the payload: a freshly constructed
            // instance has nothing to load and nothing to write.
            self.make_sure_loaded();
            let codec = self.codec();
            let payload = self.payload.as_mut().unwrap();
            codec.serialize(ar, payload.as_mut_slice())?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    fn load_payload(&mut self, ar: &mut dyn Archive, ctx: &mut SerializeContext<'_>) -> Result<()> {
        assert!(
            self.pending_fetch.is_none(),
            "deserialize requested while an async fetch is in flight"
        );
        self.detach_from_archive();
        self.filename = None;
        // Whatever was resident belongs to a previous life of this
        // instance; the incoming archive is now the source of truth.
        self.payload = None;

        if config::requires_cooked_data() && config::single_use_on_cooked_load() {
            // Cooked-only: content locked exactly once can be released on
            // first unlock. Opt-in via configuration.
            self.flags.insert(BulkDataFlags::SINGLE_USE);
        }

        ar.serialize_i32(&mut self.size_on_disk)?;
        ar.serialize_i64(&mut self.offset_in_file)?;

        let payload_inline = !self.flags.contains(BulkDataFlags::PAYLOAD_AT_END_OF_FILE);

        // End-of-file offsets are relative to the package's appended-payload
        // region when a loader provides one.
        if !payload_inline {
            if let Some(linker) = ctx.linker_load.as_ref() {
                self.offset_in_file += linker.bulk_data_start_offset;
            }
        }

        self.filename = ctx
            .linker_load
            .as_ref()
            .filter(|linker| !linker.filename.as_os_str().is_empty())
            .map(|linker| linker.filename.clone())
            .or_else(|| ar.filename().map(Path::to_path_buf));

        if ar.allows_lazy_loading() {
            self.attachment = ar.backing();
            if payload_inline {
                if self.should_stream() {
                    self.start_streaming(ar, ctx, payload_inline)?;
                } else {
                    // Inline payloads are read immediately even under lazy
                    // loading, to keep first-access cost off the hot path.
                    let mut buffer = self.acquire_buffer(ctx);
                    self.codec().serialize(ar, buffer.as_mut_slice())?;
                    self.payload = Some(buffer);
                }
            }
            // End-of-file payloads stay on disk until first access.
        } else if self.should_stream() {
            self.start_streaming(ar, ctx, payload_inline)?;
        } else {
            let mut buffer = self.acquire_buffer(ctx);
            if payload_inline {
                self.codec().serialize(ar, buffer.as_mut_slice())?;
            } else {
                let current = ar.tell();
                ar.seek(self.offset_in_file)?;
                self.codec().serialize(ar, buffer.as_mut_slice())?;
                ar.seek(current)?;
            }
            self.payload = Some(buffer);
        }

        self.sync_tracking();
        Ok(())
    }

    /// Destination for a synchronous read: resource memory when the hook
    /// offers it, engine allocation otherwise.
    fn acquire_buffer(&self, ctx: &SerializeContext<'_>) -> PayloadBuffer {
        let size = self.size();
        if let Some(provider) = ctx.resource_memory {
            if let Some(buffer) = provider.resource_memory(ctx.owner.as_ref(), ctx.index) {
                assert_eq!(
                    buffer.len(),
                    size,
                    "resource memory does not match the payload size"
                );
                return buffer;
            }
        }
        PayloadBuffer::alloc(size, self.alignment)
    }

    /// Hands the payload read to the fetch pool and, for inline payloads,
    /// advances the archive cursor past the bytes as if they had been read.
    ///
    /// The fetch snapshots filename and offset at dispatch; neither may be
    /// mutated until it is harvested.
    fn start_streaming(
        &mut self,
        ar: &mut dyn Archive,
        ctx: &mut SerializeContext<'_>,
        payload_inline: bool,
    ) -> Result<()> {
        assert!(self.pending_fetch.is_none(), "async fetch already in flight");
        let path = self
            .filename
            .clone()
            .expect("streaming requires a recorded filename");

        let preallocated = ctx
            .resource_memory
            .and_then(|provider| provider.resource_memory(ctx.owner.as_ref(), ctx.index));
        if let Some(buffer) = &preallocated {
            assert_eq!(
                buffer.len(),
                self.size(),
                "resource memory does not match the payload size"
            );
        }

        let handle = stream::dispatch_fetch(FetchRequest {
            path,
            offset: self.offset_in_file,
            total_size: self.size(),
            alignment: self.alignment,
            codec: self.codec(),
            preallocated,
        });
        self.pending_fetch = Some(handle);

        if payload_inline {
            ar.seek(ar.tell() + self.size_on_disk as i64)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    fn save_payload(
        &mut self,
        ar: &mut dyn Archive,
        ctx: &mut SerializeContext<'_>,
        flags_pos: i64,
    ) -> Result<()> {
        if ctx.store_compressed {
            self.store_compressed_on_disk(CompressionFlags::Zlib);
        }
        // Load-time compatibility knob, never persisted.
        self.flags.remove(BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION);
        self.make_sure_loaded();

        let size_pos = ar.tell();
        self.size_on_disk = -1;
        ar.serialize_i32(&mut self.size_on_disk)?;
        let offset_pos = ar.tell();
        self.offset_in_file = -1;
        ar.serialize_i64(&mut self.offset_in_file)?;

        let store_inline = self.flags.contains(BulkDataFlags::FORCE_INLINE_PAYLOAD)
            || ctx.linker_save.is_none();

        if !store_inline {
            self.flags.insert(BulkDataFlags::PAYLOAD_AT_END_OF_FILE);
            let payload = self.payload.as_ref().expect("payload resident for save");
            let record = DeferredPayload {
                flags_pos,
                size_pos,
                offset_pos,
                flags: self.flags,
                bytes: payload.as_slice().to_vec(),
                codec: self.codec(),
            };
            ctx.linker_save
                .as_mut()
                .expect("end-of-file placement requires a linker save")
                .enqueue(record);
            // Fields stay at the placeholder sentinel; the linker patches
            // the archive during its append pass.
        } else {
            self.flags.remove(BulkDataFlags::PAYLOAD_AT_END_OF_FILE);
            let start = ar.tell();
            let codec = self.codec();
            let payload = self.payload.as_mut().expect("payload resident for save");
            codec.serialize(ar, payload.as_mut_slice())?;
            let end = ar.tell();
            assert!(
                start >= 0 && end >= start,
                "bad archive positions for bulk data: start={} end={}",
                start,
                end
            );
            self.size_on_disk = (end - start) as i32;
            self.offset_in_file = start;
        }

        // Backpatch the header now that flags and placement are final,
        // then restore the cursor so subsequent writes append cleanly.
        let current = ar.tell();
        ar.seek(flags_pos)?;
        let mut flag_bits = self.flags.bits();
        ar.serialize_u32(&mut flag_bits)?;
        ar.seek(size_pos)?;
        ar.serialize_i32(&mut self.size_on_disk)?;
        ar.seek(offset_pos)?;
        ar.serialize_i64(&mut self.offset_in_file)?;
        ar.seek(current)?;
        Ok(())
    }
}
