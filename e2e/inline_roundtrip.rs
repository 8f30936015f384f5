// End-to-end: inline round-trip of an uncompressed byte payload.
//
// Coverage:
//   - save to an in-memory archive, reload into a fresh instance
//   - payload bytes bitwise equal after the round-trip
//   - size_on_disk equals the logical size for uncompressed payloads
//   - offset_in_file points right past the 20-byte header
//   - archive cursor is deterministic after serialize in both directions

use bulkdata::{Archive, BulkData, BulkDataFlags, LockFlags, MemoryArchive, SerializeContext};

const HEADER_SIZE: i64 = 20; // u32 flags + i32 count + i32 size + i64 offset

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn inline_uncompressed_byte_round_trip() {
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut bulk = byte_bulk(&payload);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();
    assert_eq!(writer.tell(), HEADER_SIZE + 8);

    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(reader.tell(), HEADER_SIZE + 8);

    assert_eq!(restored.element_count(), 8);
    assert_eq!(restored.size_on_disk(), 8);
    assert_eq!(restored.offset_in_file(), HEADER_SIZE);
    assert_eq!(restored.lock_read_only(), &payload);
    restored.unlock();
}

#[test]
fn empty_payload_round_trips_header_only() {
    let mut bulk = BulkData::byte();
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();
    assert_eq!(writer.len() as i64, HEADER_SIZE);

    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(restored.element_count(), 0);
    assert_eq!(restored.size_on_disk(), 0);
    assert!(restored.is_loaded());
}

#[test]
fn word_and_float_payloads_round_trip() {
    let words = [0x0102u16, 0x0304, 0xFFFF];
    let mut bulk = BulkData::word();
    bulk.lock(LockFlags::READ_WRITE);
    let slice = bulk.realloc(3);
    for (i, w) in words.iter().enumerate() {
        slice[i * 2..i * 2 + 2].copy_from_slice(&w.to_ne_bytes());
    }
    bulk.unlock();

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    let mut restored = BulkData::word();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    let data = restored.lock_read_only();
    for (i, w) in words.iter().enumerate() {
        assert_eq!(u16::from_ne_bytes([data[i * 2], data[i * 2 + 1]]), *w);
    }
    restored.unlock();

    let floats = [1.5f32, -0.25, 1.0e-10];
    let mut bulk = BulkData::float32();
    bulk.lock(LockFlags::READ_WRITE);
    let slice = bulk.realloc(3);
    for (i, v) in floats.iter().enumerate() {
        slice[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
    }
    bulk.unlock();

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    let mut restored = BulkData::float32();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    let data = restored.lock_read_only();
    for (i, v) in floats.iter().enumerate() {
        let bits = [data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]];
        assert_eq!(f32::from_ne_bytes(bits), *v);
    }
    restored.unlock();
}
