//! Flag words and policy selectors for bulk data instances.
//!
//! [`BulkDataFlags`] is the persisted 32-bit flag word written at the front
//! of every bulk data header. [`LockStatus`] tracks the runtime lock state
//! machine and is never persisted. [`CompressionFlags`] selects the on-disk
//! codec derived from the flag word.

use bitflags::bitflags;

bitflags! {
    /// Per-instance behavior flags, serialized as a 32-bit word.
    ///
    /// Unknown bits read from older or newer archives are preserved
    /// round-trip (`from_bits_retain`) but have no effect on this engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BulkDataFlags: u32 {
        /// Payload is stored zlib-compressed on disk.
        const SERIALIZE_COMPRESSED_ZLIB = 1 << 1;
        /// Force the per-element codec path even where bulk serialization
        /// would be legal. Load-time compatibility knob, never persisted.
        const FORCE_SINGLE_ELEMENT_SERIALIZATION = 1 << 2;
        /// Payload is released on first unlock; callers must not re-lock.
        const SINGLE_USE = 1 << 3;
        /// Instance carries no payload; the codec is skipped entirely.
        const UNUSED = 1 << 5;
        /// Payload must be written immediately after its header.
        const FORCE_INLINE_PAYLOAD = 1 << 6;
        /// Payload lives in the appended region at the end of the archive,
        /// referenced from the header by absolute offset.
        const PAYLOAD_AT_END_OF_FILE = 1 << 8;
        /// Always stream the payload on load, regardless of size.
        const FORCE_STREAM_PAYLOAD = 1 << 10;
    }
}

impl BulkDataFlags {
    /// Mask of every compressed-codec bit. Currently zlib only.
    pub const SERIALIZE_COMPRESSED: BulkDataFlags = BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB;

    /// Returns the codec selector implied by the compression bits.
    pub fn compression(self) -> CompressionFlags {
        if self.contains(BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB) {
            CompressionFlags::Zlib
        } else {
            CompressionFlags::None
        }
    }
}

/// On-disk payload codec selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFlags {
    /// Raw bytes, no compression framing.
    #[default]
    None,
    /// zlib (DEFLATE with zlib header and checksum).
    Zlib,
}

bitflags! {
    /// Lock request flags accepted by `BulkData::lock`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockFlags: u32 {
        const READ_ONLY = 1 << 0;
        const READ_WRITE = 1 << 1;
    }
}

/// Runtime lock state of a bulk data instance.
///
/// Transitions outside the documented state machine are programming errors
/// and trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockStatus {
    #[default]
    Unlocked,
    ReadOnly,
    ReadWrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_clear_restores_original() {
        let original = BulkDataFlags::SINGLE_USE | BulkDataFlags::FORCE_INLINE_PAYLOAD;
        let mut flags = original;
        flags |= BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB | BulkDataFlags::UNUSED;
        flags &= !(BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB | BulkDataFlags::UNUSED);
        assert_eq!(flags, original);
    }

    #[test]
    fn compressed_mask_covers_zlib() {
        assert!(BulkDataFlags::SERIALIZE_COMPRESSED
            .contains(BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB));
    }

    #[test]
    fn compression_selector() {
        assert_eq!(BulkDataFlags::empty().compression(), CompressionFlags::None);
        assert_eq!(
            BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB.compression(),
            CompressionFlags::Zlib
        );
    }

    #[test]
    fn unknown_bits_survive_round_trip() {
        let word = 0x8000_0001u32;
        let flags = BulkDataFlags::from_bits_retain(word);
        assert_eq!(flags.bits(), word);
    }
}
