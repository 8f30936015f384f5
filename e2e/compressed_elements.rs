// End-to-end: compressed int32 payload through a byte-swapping archive.
//
// Coverage:
//   - zlib-compressed save and reload of multi-byte elements
//   - per-element decode on load via the caller-set single-element knob
//   - compression and forced-inline placement are mutually exclusive
//   - compressed size_on_disk differs from the logical size

use bulkdata::{
    BulkData, BulkDataFlags, CompressionFlags, LockFlags, MemoryArchive, SerializeContext,
};

fn int32_bulk(values: &[i32]) -> BulkData {
    let mut bulk = BulkData::int32();
    bulk.lock(LockFlags::READ_WRITE);
    let slice = bulk.realloc(values.len() as i32);
    for (i, v) in values.iter().enumerate() {
        slice[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
    }
    bulk.unlock();
    bulk
}

fn int32_values(bulk: &mut BulkData) -> Vec<i32> {
    let data = bulk.lock_read_only().to_vec();
    bulk.unlock();
    data.chunks_exact(4)
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn compressed_int32_round_trip_under_byte_swapping() {
    let values = [0x01020304i32, 0x05060708];
    let mut bulk = int32_bulk(&values);
    bulk.set_flags(
        BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB
            | BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION,
    );

    let mut writer = MemoryArchive::writer();
    writer.set_force_byte_swapping(true);
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    let mut restored = BulkData::int32();
    // The knob lives on the loading side; it is never persisted.
    restored.set_flags(BulkDataFlags::FORCE_SINGLE_ELEMENT_SERIALIZATION);
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    assert!(restored.is_stored_compressed_on_disk());
    assert_eq!(restored.decompression_flags(), CompressionFlags::Zlib);
    assert_eq!(int32_values(&mut restored), values);
}

#[test]
fn compressed_payload_shrinks_on_disk() {
    // 1 KiB of heavily repetitive int32 data.
    let values = vec![0x11111111i32; 256];
    let mut bulk = int32_bulk(&values);
    bulk.store_compressed_on_disk(CompressionFlags::Zlib);

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();
    assert!((bulk.size_on_disk() as usize) < bulk.size());

    let mut reader = writer.into_reader();
    let mut restored = BulkData::int32();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(restored.size(), 1024);
    assert_eq!(int32_values(&mut restored), values);
}

#[test]
fn enabling_compression_clears_forced_inline() {
    let mut bulk = int32_bulk(&[1, 2, 3]);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);
    bulk.store_compressed_on_disk(CompressionFlags::Zlib);
    assert!(!bulk.flags().contains(BulkDataFlags::FORCE_INLINE_PAYLOAD));
    assert!(bulk.flags().contains(BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB));

    // Switching back off keeps inline cleared but drops the codec bits.
    bulk.store_compressed_on_disk(CompressionFlags::None);
    assert!(!bulk.is_stored_compressed_on_disk());
}
