// End-to-end: end-of-file payload placement with deferred backpatch.
//
// Coverage:
//   - without FORCE_INLINE_PAYLOAD and with a linker save, the payload is
//     deferred and only the header is written during serialize
//   - finalize appends the payload and backpatches flags/size/offset
//   - the patched header reads back with the appended-region offset
//   - reload resolves the end-of-file payload and leaves the cursor just
//     past the header, regardless of payload size

use bulkdata::{
    Archive, BulkData, BulkDataFlags, LinkerLoad, LinkerSave, LockFlags, MemoryArchive,
    SerializeContext,
};

const HEADER_SIZE: i64 = 20;

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn eof_payload_is_appended_and_backpatched() {
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut bulk = byte_bulk(&payload);

    let mut linker = LinkerSave::new();
    let mut writer = MemoryArchive::writer();
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk.serialize(&mut writer, &mut ctx).unwrap();
    }
    // Only the header so far; the payload is queued on the linker.
    assert_eq!(writer.tell(), HEADER_SIZE);
    assert_eq!(linker.pending_count(), 1);

    // The rest of the owner's body, then the linker's append pass.
    let mut body = [0xCCu8; 6];
    writer.serialize(&mut body).unwrap();
    let append_start = writer.tell();
    linker.finalize(&mut writer).unwrap();

    let bytes = writer.bytes();
    assert_eq!(&bytes[append_start as usize..], &payload);

    // Patched header fields.
    let mut reader = MemoryArchive::reader(bytes);
    let (mut flags, mut count, mut size, mut offset) = (0u32, 0i32, 0i32, 0i64);
    reader.serialize_u32(&mut flags).unwrap();
    reader.serialize_i32(&mut count).unwrap();
    reader.serialize_i32(&mut size).unwrap();
    reader.serialize_i64(&mut offset).unwrap();
    assert_ne!(flags & BulkDataFlags::PAYLOAD_AT_END_OF_FILE.bits(), 0);
    assert_eq!(count, 8);
    assert_eq!(size, 8);
    assert_eq!(offset, append_start);
}

#[test]
fn eof_payload_reloads_and_cursor_stays_after_header() {
    let payload: Vec<u8> = (0..64u8).collect();
    let mut bulk = byte_bulk(&payload);

    let mut linker = LinkerSave::new();
    let mut writer = MemoryArchive::writer();
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk.serialize(&mut writer, &mut ctx).unwrap();
    }
    linker.finalize(&mut writer).unwrap();

    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    // The payload lives past the end of the body; reading it must not move
    // the body cursor.
    assert_eq!(reader.tell(), HEADER_SIZE);
    assert_eq!(restored.size_on_disk(), 64);
    assert_eq!(restored.offset_in_file(), HEADER_SIZE);
    assert_eq!(restored.lock_read_only(), &payload[..]);
    restored.unlock();
}

#[test]
fn linker_load_offset_base_applies_to_eof_payloads() {
    let payload = [9u8, 8, 7, 6];
    let mut bulk = byte_bulk(&payload);

    let mut linker = LinkerSave::new();
    let mut writer = MemoryArchive::writer();
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk.serialize(&mut writer, &mut ctx).unwrap();
    }
    let append_start = writer.tell();
    linker.finalize(&mut writer).unwrap();

    // Rewrite the stored offset as relative to the appended region, the
    // way a package summary would base it, and supply the base on load.
    // The offset field occupies header bytes 12..20.
    let mut bytes = writer.bytes();
    bytes[12..20].copy_from_slice(&0i64.to_le_bytes());

    let mut reader = MemoryArchive::reader(bytes);
    let linker_load =
        LinkerLoad { filename: Default::default(), bulk_data_start_offset: append_start };
    let mut ctx = SerializeContext { linker_load: Some(&linker_load), ..Default::default() };
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut ctx).unwrap();

    assert_eq!(restored.offset_in_file(), append_start);
    assert_eq!(restored.lock_read_only(), &payload);
    restored.unlock();
}

#[test]
fn multiple_instances_share_one_append_pass() {
    let payload_a = [0xAAu8; 3];
    let payload_b = [0xBBu8; 5];
    let mut bulk_a = byte_bulk(&payload_a);
    let mut bulk_b = byte_bulk(&payload_b);

    let mut linker = LinkerSave::new();
    let mut writer = MemoryArchive::writer();
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk_a.serialize(&mut writer, &mut ctx).unwrap();
    }
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk_b.serialize(&mut writer, &mut ctx).unwrap();
    }
    assert_eq!(linker.pending_count(), 2);
    let append_start = writer.tell();
    linker.finalize(&mut writer).unwrap();

    let bytes = writer.bytes();
    assert_eq!(&bytes[append_start as usize..append_start as usize + 3], &payload_a);
    assert_eq!(&bytes[append_start as usize + 3..], &payload_b);

    // Both reload from their backpatched offsets.
    let mut reader = MemoryArchive::reader(bytes);
    let mut restored_a = BulkData::byte();
    restored_a.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    let mut restored_b = BulkData::byte();
    restored_b.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(restored_a.lock_read_only(), &payload_a);
    restored_a.unlock();
    assert_eq!(restored_b.lock_read_only(), &payload_b);
    restored_b.unlock();
}
