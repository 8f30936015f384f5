//! Linker contexts: deferred end-of-file payload placement on save, and the
//! offset base plus filename a loader supplies.
//!
//! During a linker-driven save, bulk data headers are written with
//! placeholder size and offset fields and the payloads are queued here.
//! After the parent's main body is complete, [`LinkerSave::finalize`]
//! appends every queued payload to the archive and backpatches the three
//! header fields it was told about.

use std::path::PathBuf;

use crate::archive::Archive;
use crate::bulk::codec::PayloadCodec;
use crate::error::Result;
use crate::flags::BulkDataFlags;

/// Load-side linker context: where end-of-file payload offsets are based,
/// and which file the archive was opened from.
#[derive(Debug, Clone, Default)]
pub struct LinkerLoad {
    /// Path the payload can be re-read from after the archive is gone.
    pub filename: PathBuf,
    /// Base added to every end-of-file payload offset. Lets a package place
    /// its appended-payload region independently of the header positions.
    pub bulk_data_start_offset: i64,
}

/// One queued end-of-file payload with the header positions to backpatch.
pub(crate) struct DeferredPayload {
    pub flags_pos: i64,
    pub size_pos: i64,
    pub offset_pos: i64,
    pub flags: BulkDataFlags,
    /// Resident payload bytes snapshotted at header-write time; the codec
    /// runs over them during the append pass, so compression happens there.
    pub bytes: Vec<u8>,
    pub codec: PayloadCodec,
}

/// Save-side linker context accumulating deferred payload appends.
///
/// Caller-owned and single-threaded; records resolve in FIFO order so the
/// appended region is deterministic.
#[derive(Default)]
pub struct LinkerSave {
    pending: Vec<DeferredPayload>,
}

impl LinkerSave {
    pub fn new() -> LinkerSave {
        LinkerSave::default()
    }

    /// Number of payloads waiting for the append pass.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn enqueue(&mut self, record: DeferredPayload) {
        self.pending.push(record);
    }

    /// Appends every queued payload at the archive's current position and
    /// overwrites the recorded flags, size-on-disk, and offset placeholders.
    ///
    /// Leaves the cursor at the end of the appended region.
    pub fn finalize(&mut self, ar: &mut dyn Archive) -> Result<()> {
        for mut record in self.pending.drain(..) {
            let start = ar.tell();
            record.codec.serialize(ar, &mut record.bytes)?;
            let end = ar.tell();

            let mut size_on_disk = (end - start) as i32;
            let mut offset_in_file = start;
            let mut flag_bits = record.flags.bits();

            ar.seek(record.flags_pos)?;
            ar.serialize_u32(&mut flag_bits)?;
            ar.seek(record.size_pos)?;
            ar.serialize_i32(&mut size_on_disk)?;
            ar.seek(record.offset_pos)?;
            ar.serialize_i64(&mut offset_in_file)?;
            ar.seek(end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::element::ElementType;

    #[test]
    fn finalize_appends_and_backpatches() {
        let mut ar = MemoryArchive::writer();
        // Stand-in header: flags, size, offset placeholders.
        let flags_pos = ar.tell();
        let mut flag_bits = 0u32;
        ar.serialize_u32(&mut flag_bits).unwrap();
        let size_pos = ar.tell();
        let mut size = -1i32;
        ar.serialize_i32(&mut size).unwrap();
        let offset_pos = ar.tell();
        let mut offset = -1i64;
        ar.serialize_i64(&mut offset).unwrap();

        let flags = BulkDataFlags::PAYLOAD_AT_END_OF_FILE;
        let mut linker = LinkerSave::new();
        linker.enqueue(DeferredPayload {
            flags_pos,
            size_pos,
            offset_pos,
            flags,
            bytes: vec![9, 8, 7, 6],
            codec: PayloadCodec { flags, element: ElementType::byte(), element_count: 4 },
        });
        assert_eq!(linker.pending_count(), 1);

        let body_end = ar.tell();
        linker.finalize(&mut ar).unwrap();
        assert_eq!(linker.pending_count(), 0);

        let bytes = ar.bytes();
        // Payload appended right after the body.
        assert_eq!(&bytes[body_end as usize..], &[9, 8, 7, 6]);
        // Backpatched header fields.
        let mut reader = MemoryArchive::reader(bytes);
        let (mut f, mut s, mut o) = (0u32, 0i32, 0i64);
        reader.serialize_u32(&mut f).unwrap();
        reader.serialize_i32(&mut s).unwrap();
        reader.serialize_i64(&mut o).unwrap();
        assert_eq!(f, flags.bits());
        assert_eq!(s, 4);
        assert_eq!(o, body_end);
        // Cursor restored to the end of the appended region.
        assert_eq!(ar.tell() as usize, ar.len());
    }

    #[test]
    fn records_resolve_in_fifo_order() {
        let mut ar = MemoryArchive::writer();
        let mut linker = LinkerSave::new();
        let mut positions = Vec::new();
        for payload in [vec![1u8, 1], vec![2u8, 2]] {
            let flags_pos = ar.tell();
            let mut bits = 0u32;
            ar.serialize_u32(&mut bits).unwrap();
            let size_pos = ar.tell();
            let mut size = -1i32;
            ar.serialize_i32(&mut size).unwrap();
            let offset_pos = ar.tell();
            let mut offset = -1i64;
            ar.serialize_i64(&mut offset).unwrap();
            positions.push(offset_pos);
            let flags = BulkDataFlags::PAYLOAD_AT_END_OF_FILE;
            linker.enqueue(DeferredPayload {
                flags_pos,
                size_pos,
                offset_pos,
                flags,
                codec: PayloadCodec { flags, element: ElementType::byte(), element_count: 2 },
                bytes: payload,
            });
        }
        let body_end = ar.tell();
        linker.finalize(&mut ar).unwrap();

        let bytes = ar.bytes();
        assert_eq!(&bytes[body_end as usize..], &[1, 1, 2, 2]);
    }
}
