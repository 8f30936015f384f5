// End-to-end: single-use payload release.
//
// Coverage:
//   - an instance loaded with SINGLE_USE drops its payload on first unlock
//   - element_count survives the release
//   - the released payload can still be paged back in while the source
//     archive is attached

use bulkdata::{BulkData, BulkDataFlags, LockFlags, MemoryArchive, SerializeContext};

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn single_use_payload_released_on_first_unlock() {
    let mut bulk = byte_bulk(&[10, 20, 30, 40]);
    bulk.set_flags(BulkDataFlags::SINGLE_USE | BulkDataFlags::FORCE_INLINE_PAYLOAD);

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(restored.flags().contains(BulkDataFlags::SINGLE_USE));
    assert!(restored.is_loaded());

    let first = restored.lock_read_only()[0];
    assert_eq!(first, 10);
    restored.unlock();

    assert!(!restored.is_loaded());
    assert_eq!(restored.element_count(), 4);
}

#[test]
fn single_use_reload_through_attachment() {
    let mut bulk = byte_bulk(&[7, 7, 7]);
    bulk.set_flags(BulkDataFlags::SINGLE_USE);

    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    reader.set_lazy_loading(true);
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    restored.lock_read_only();
    restored.unlock();
    assert!(!restored.is_loaded());
    // Still attached, so a second access reloads from the archive.
    assert!(restored.can_load_from_disk());
    assert_eq!(restored.lock_read_only(), &[7, 7, 7]);
    restored.unlock();
}
