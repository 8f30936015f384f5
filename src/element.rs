//! Element typing for bulk payloads.
//!
//! A payload is a logically-sized array of fixed-width elements. The four
//! built-in widths differ only in size and per-element transfer, so the
//! type is a tagged variant carrying both rather than a trait hierarchy:
//! `{size, serialize_one}`. The per-element hook is what gives the codec
//! its endian-aware fallback path.

use crate::archive::Archive;
use crate::error::Result;

/// Per-element transfer hook. `element` is exactly one element's bytes in
/// native order; the archive applies byte swapping as configured.
pub type SerializeElementFn = fn(&mut dyn Archive, &mut [u8]) -> Result<()>;

/// Fixed-width element descriptor.
#[derive(Clone, Copy)]
pub struct ElementType {
    size: usize,
    serialize_one: SerializeElementFn,
    name: &'static str,
}

impl ElementType {
    /// 1-byte element. Bulk-transfers byte-for-byte on every path.
    pub const fn byte() -> ElementType {
        ElementType { size: 1, serialize_one: serialize_byte, name: "byte" }
    }

    /// 2-byte unsigned element.
    pub const fn word() -> ElementType {
        ElementType { size: 2, serialize_one: serialize_word, name: "word" }
    }

    /// 4-byte signed integer element.
    pub const fn int32() -> ElementType {
        ElementType { size: 4, serialize_one: serialize_int32, name: "int32" }
    }

    /// 4-byte float element, transferred as its bit pattern.
    pub const fn float32() -> ElementType {
        ElementType { size: 4, serialize_one: serialize_float32, name: "float32" }
    }

    /// User-defined element of `size` bytes with a caller-supplied
    /// per-element transfer.
    pub const fn custom(size: usize, serialize_one: SerializeElementFn) -> ElementType {
        ElementType { size, serialize_one, name: "custom" }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transfers the element at `index` within `data` through the archive.
    pub fn serialize_element(
        &self,
        ar: &mut dyn Archive,
        data: &mut [u8],
        index: usize,
    ) -> Result<()> {
        let start = index * self.size;
        (self.serialize_one)(ar, &mut data[start..start + self.size])
    }
}

impl Default for ElementType {
    fn default() -> Self {
        ElementType::byte()
    }
}

impl std::fmt::Debug for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementType")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

fn serialize_byte(ar: &mut dyn Archive, element: &mut [u8]) -> Result<()> {
    let mut value = element[0];
    ar.serialize_u8(&mut value)?;
    element[0] = value;
    Ok(())
}

fn serialize_word(ar: &mut dyn Archive, element: &mut [u8]) -> Result<()> {
    let mut value = u16::from_ne_bytes([element[0], element[1]]);
    ar.serialize_u16(&mut value)?;
    element.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

fn serialize_int32(ar: &mut dyn Archive, element: &mut [u8]) -> Result<()> {
    let mut value = i32::from_ne_bytes([element[0], element[1], element[2], element[3]]);
    ar.serialize_i32(&mut value)?;
    element.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

fn serialize_float32(ar: &mut dyn Archive, element: &mut [u8]) -> Result<()> {
    let mut value = f32::from_ne_bytes([element[0], element[1], element[2], element[3]]);
    ar.serialize_f32(&mut value)?;
    element.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    #[test]
    fn built_in_sizes() {
        assert_eq!(ElementType::byte().size(), 1);
        assert_eq!(ElementType::word().size(), 2);
        assert_eq!(ElementType::int32().size(), 4);
        assert_eq!(ElementType::float32().size(), 4);
    }

    #[test]
    fn int32_elements_swap_through_archive() {
        let values = [0x01020304i32, 0x05060708];
        let mut data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();

        let mut writer = MemoryArchive::writer();
        writer.set_force_byte_swapping(true);
        let element = ElementType::int32();
        for index in 0..values.len() {
            element.serialize_element(&mut writer, &mut data, index).unwrap();
        }
        // Big-endian on disk.
        assert_eq!(&writer.bytes()[..4], &[0x01, 0x02, 0x03, 0x04]);

        let mut reader = writer.into_reader();
        let mut restored = vec![0u8; 8];
        for index in 0..values.len() {
            element.serialize_element(&mut reader, &mut restored, index).unwrap();
        }
        assert_eq!(restored, data);
    }

    #[test]
    fn custom_element_hook_runs_per_element() {
        fn swap_pair(ar: &mut dyn Archive, element: &mut [u8]) -> Result<()> {
            // 2-byte element stored reversed on disk.
            let mut swapped = [element[1], element[0]];
            ar.serialize(&mut swapped)?;
            element.copy_from_slice(&[swapped[1], swapped[0]]);
            Ok(())
        }
        let element = ElementType::custom(2, swap_pair);
        let mut data = vec![1u8, 2, 3, 4];
        let mut writer = MemoryArchive::writer();
        element.serialize_element(&mut writer, &mut data, 0).unwrap();
        element.serialize_element(&mut writer, &mut data, 1).unwrap();
        assert_eq!(writer.bytes(), vec![2, 1, 4, 3]);
    }
}
