//! The archive collaborator contract and its built-in implementations.
//!
//! An [`Archive`] is an abstract serialization stream: tell/seek, raw and
//! endian-aware typed read/write, a compressed-serialize primitive, and a
//! set of mode queries (loading/saving/transacting/cooking, lazy-loading
//! policy, forced byte swapping). Typed helpers and the compressed codec
//! are provided methods so every implementation shares one wire format.
//!
//! Two implementations ship with the engine:
//! - [`MemoryArchive`] — growable in-memory store, shareable between a
//!   writer and later readers, with observable bulk-data attachment.
//! - [`FileReaderArchive`] — read-only file-backed archive used for
//!   filename-based reload and background payload fetch.

pub mod file;
pub mod memory;

pub use file::FileReaderArchive;
pub use memory::{ArchiveBacking, MemoryArchive};

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{ArchiveError, Result};
use crate::flags::CompressionFlags;

/// Abstract serialization stream.
///
/// The `serialize_*` helpers are bidirectional: they read into the value
/// when the archive is loading and write from it when saving, so load and
/// save code paths stay structurally identical.
pub trait Archive {
    /// True when the archive produces data (deserialization).
    fn is_loading(&self) -> bool;

    /// True when the archive consumes data (serialization).
    fn is_saving(&self) -> bool {
        !self.is_loading()
    }

    /// True for undo/redo transaction buffers.
    fn is_transacting(&self) -> bool {
        false
    }

    /// True while cooking shipping content.
    fn is_cooking(&self) -> bool {
        false
    }

    /// Whether bulk payloads may stay on disk and be read on first access.
    fn allows_lazy_loading(&self) -> bool {
        false
    }

    /// Whether multi-byte values are stored in the opposite byte order from
    /// the host (big-endian on disk).
    fn force_byte_swapping(&self) -> bool {
        false
    }

    /// Current stream position in bytes.
    fn tell(&self) -> i64;

    /// Moves the stream position. Writers may seek backwards to overwrite
    /// previously written placeholders.
    fn seek(&mut self, pos: i64) -> Result<()>;

    /// Raw byte transfer: fills `data` when loading, emits it when saving.
    fn serialize(&mut self, data: &mut [u8]) -> Result<()>;

    /// Returns a handle through which an attached bulk data instance can
    /// re-read its payload after the fact. `None` for archives that do not
    /// support attachment (the instance falls back to its recorded filename).
    fn backing(&self) -> Option<ArchiveBacking> {
        None
    }

    /// Path of the backing file, when the archive has one.
    fn filename(&self) -> Option<&Path> {
        None
    }

    fn serialize_u8(&mut self, value: &mut u8) -> Result<()> {
        let mut buf = [*value];
        self.serialize(&mut buf)?;
        *value = buf[0];
        Ok(())
    }

    fn serialize_u16(&mut self, value: &mut u16) -> Result<()> {
        let mut buf = [0u8; 2];
        if self.is_saving() {
            if self.force_byte_swapping() {
                BigEndian::write_u16(&mut buf, *value);
            } else {
                LittleEndian::write_u16(&mut buf, *value);
            }
            self.serialize(&mut buf)
        } else {
            self.serialize(&mut buf)?;
            *value = if self.force_byte_swapping() {
                BigEndian::read_u16(&buf)
            } else {
                LittleEndian::read_u16(&buf)
            };
            Ok(())
        }
    }

    fn serialize_u32(&mut self, value: &mut u32) -> Result<()> {
        let mut buf = [0u8; 4];
        if self.is_saving() {
            if self.force_byte_swapping() {
                BigEndian::write_u32(&mut buf, *value);
            } else {
                LittleEndian::write_u32(&mut buf, *value);
            }
            self.serialize(&mut buf)
        } else {
            self.serialize(&mut buf)?;
            *value = if self.force_byte_swapping() {
                BigEndian::read_u32(&buf)
            } else {
                LittleEndian::read_u32(&buf)
            };
            Ok(())
        }
    }

    fn serialize_i32(&mut self, value: &mut i32) -> Result<()> {
        let mut bits = *value as u32;
        self.serialize_u32(&mut bits)?;
        *value = bits as i32;
        Ok(())
    }

    fn serialize_i64(&mut self, value: &mut i64) -> Result<()> {
        let mut buf = [0u8; 8];
        if self.is_saving() {
            if self.force_byte_swapping() {
                BigEndian::write_i64(&mut buf, *value);
            } else {
                LittleEndian::write_i64(&mut buf, *value);
            }
            self.serialize(&mut buf)
        } else {
            self.serialize(&mut buf)?;
            *value = if self.force_byte_swapping() {
                BigEndian::read_i64(&buf)
            } else {
                LittleEndian::read_i64(&buf)
            };
            Ok(())
        }
    }

    /// Floats travel as their raw bit pattern so byte swapping cannot
    /// manufacture signalling NaNs mid-transfer.
    fn serialize_f32(&mut self, value: &mut f32) -> Result<()> {
        let mut bits = value.to_bits();
        self.serialize_u32(&mut bits)?;
        *value = f32::from_bits(bits);
        Ok(())
    }

    /// Booleans occupy a full 32-bit word on disk.
    fn serialize_bool(&mut self, value: &mut bool) -> Result<()> {
        let mut word = u32::from(*value);
        self.serialize_u32(&mut word)?;
        *value = word != 0;
        Ok(())
    }

    /// Length-prefixed UTF-8 string (i32 byte count, then the bytes).
    fn serialize_string(&mut self, value: &mut String) -> Result<()> {
        if self.is_saving() {
            let mut len = value.len() as i32;
            self.serialize_i32(&mut len)?;
            let mut bytes = value.clone().into_bytes();
            self.serialize(&mut bytes)
        } else {
            let mut len = 0i32;
            self.serialize_i32(&mut len)?;
            if len < 0 {
                return Err(ArchiveError::Corrupt(format!("negative string length {}", len)));
            }
            let mut bytes = vec![0u8; len as usize];
            self.serialize(&mut bytes)?;
            *value = String::from_utf8(bytes)
                .map_err(|_| ArchiveError::Corrupt("string is not valid UTF-8".into()))?;
            Ok(())
        }
    }

    /// Compressed byte transfer: frames `data` as
    /// `[i64 uncompressed size][i64 compressed size][zlib stream]`.
    ///
    /// With [`CompressionFlags::None`] this degenerates to a raw transfer
    /// with no framing, so callers can select the codec purely from flags.
    fn serialize_compressed(
        &mut self,
        data: &mut [u8],
        compression: CompressionFlags,
    ) -> Result<()> {
        if compression == CompressionFlags::None {
            return self.serialize(data);
        }
        if self.is_saving() {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).map_err(ArchiveError::from)?;
            let mut compressed = encoder.finish().map_err(ArchiveError::from)?;

            let mut raw_size = data.len() as i64;
            let mut compressed_size = compressed.len() as i64;
            self.serialize_i64(&mut raw_size)?;
            self.serialize_i64(&mut compressed_size)?;
            self.serialize(&mut compressed)
        } else {
            let mut raw_size = 0i64;
            let mut compressed_size = 0i64;
            self.serialize_i64(&mut raw_size)?;
            self.serialize_i64(&mut compressed_size)?;
            if raw_size != data.len() as i64 {
                return Err(ArchiveError::Corrupt(format!(
                    "compressed payload inflates to {} bytes, expected {}",
                    raw_size,
                    data.len()
                )));
            }
            if compressed_size < 0 {
                return Err(ArchiveError::Corrupt(format!(
                    "negative compressed size {}",
                    compressed_size
                )));
            }
            let mut compressed = vec![0u8; compressed_size as usize];
            self.serialize(&mut compressed)?;

            let mut decoder = ZlibDecoder::new(&compressed[..]);
            decoder.read_exact(data).map_err(ArchiveError::from)?;
            let mut probe = [0u8; 1];
            let trailing = decoder.read(&mut probe).map_err(ArchiveError::from)?;
            if trailing != 0 {
                return Err(ArchiveError::Corrupt(
                    "compressed payload holds more bytes than the header declared".into(),
                ));
            }
            Ok(())
        }
    }
}
