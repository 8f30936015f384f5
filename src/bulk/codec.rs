//! Payload codec: transfers the raw payload bytes through an archive.
//!
//! Two paths. The bulk path moves the whole byte range in one call,
//! optionally through the archive's compressed-serialize primitive. The
//! per-element path iterates elements through the variant hook so byte
//! swapping applies; combined with compression it bounces through an
//! in-memory archive, because the compressed frame covers the payload as a
//! whole and cannot be produced piecewise.

use crate::archive::{Archive, MemoryArchive};
use crate::element::ElementType;
use crate::error::Result;
use crate::flags::BulkDataFlags;

/// Everything the codec needs, detached from the owning instance so the
/// linker's deferred-append pass and the background fetch task can run the
/// same transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PayloadCodec {
    pub flags: BulkDataFlags,
    pub element: ElementType,
    pub element_count: i32,
}

impl PayloadCodec {
    /// Transfers `data` (exactly `element_count * element.size()` bytes)
    /// through `ar` in the direction the archive dictates.
    pub fn serialize(&self, ar: &mut dyn Archive, data: &mut [u8]) -> Result<()> {
        if self.flags.contains(BulkDataFlags::UNUSED) {
            return Ok(());
        }
        let total = self.element_count as usize * self.element.size();
        if total == 0 {
            return Ok(());
        }
        debug_assert_eq!(data.len(), total, "payload slice does not match element count");

        let compression = self.flags.compression();
        let compressed = self.flags.intersects(BulkDataFlags::SERIALIZE_COMPRESSED);

        // Bulk transfer unless the per-element hook is required. Saving
        // multi-byte elements goes per-element so a load on a byte-swapped
        // platform can always recover them; single-byte payloads (textures,
        // sound) keep the fast path in both directions.
        let per_element = self.flags.contains(BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION)
            || (ar.is_saving() && self.element.size() > 1);

        if !per_element {
            if compressed {
                ar.serialize_compressed(data, compression)
            } else {
                ar.serialize(data)
            }
        } else if compressed {
            if ar.is_loading() {
                // Decompress into a bounce buffer, then pull elements out of
                // it with the byte swapping inherited from the outer archive.
                let mut bounce = vec![0u8; total];
                ar.serialize_compressed(&mut bounce, compression)?;
                let mut reader = MemoryArchive::reader(bounce);
                reader.set_force_byte_swapping(ar.force_byte_swapping());
                self.serialize_elements(&mut reader, data)
            } else {
                // Push elements into a bounce buffer with byte swapping,
                // then compress the bounce as one frame.
                let mut writer = MemoryArchive::writer();
                writer.set_force_byte_swapping(ar.force_byte_swapping());
                self.serialize_elements(&mut writer, data)?;
                let mut bounce = writer.bytes();
                ar.serialize_compressed(&mut bounce, compression)
            }
        } else {
            self.serialize_elements(ar, data)
        }
    }

    fn serialize_elements(&self, ar: &mut dyn Archive, data: &mut [u8]) -> Result<()> {
        for index in 0..self.element_count as usize {
            self.element.serialize_element(ar, data, index)?;
        }
        Ok(())
    }
}
