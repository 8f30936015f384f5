// End-to-end: archive attachment and the detach-on-read-write-lock rule.
//
// Coverage:
//   - a lazy load leaves the instance attached to its source archive
//   - a read-only lock keeps the attachment
//   - a read-write lock detaches before returning, and the archive's
//     attachment count observes it
//   - force_resident and remove also detach
//   - archive teardown invalidates the attachment without touching the
//     instance

use bulkdata::{BulkData, BulkDataFlags, LockFlags, MemoryArchive, SerializeContext};

fn saved_archive(bytes: &[u8]) -> MemoryArchive {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();
    let mut reader = writer.into_reader();
    reader.set_lazy_loading(true);
    reader
}

#[test]
fn read_write_lock_detaches_from_archive() {
    let mut reader = saved_archive(&[1, 2, 3, 4]);
    let mut bulk = BulkData::byte();
    bulk.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    assert!(bulk.is_attached());
    assert_eq!(reader.attached_count(), 1);

    // Read-only access does not detach.
    bulk.lock_read_only();
    bulk.unlock();
    assert!(bulk.is_attached());

    // Mutating access must detach so the archive can never write through
    // freshly mutated bytes on a later reload.
    let slice = bulk.lock(LockFlags::READ_WRITE);
    slice[0] = 99;
    bulk.unlock();
    assert!(!bulk.is_attached());
    assert_eq!(reader.attached_count(), 0);

    // The archive stays detached afterwards.
    bulk.lock_read_only();
    bulk.unlock();
    assert!(!bulk.is_attached());
}

#[test]
fn force_resident_and_remove_detach() {
    let mut reader = saved_archive(&[5, 6]);
    let mut bulk = BulkData::byte();
    bulk.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(reader.attached_count(), 1);
    bulk.force_resident();
    assert!(!bulk.is_attached());
    assert_eq!(reader.attached_count(), 0);

    let mut other = BulkData::byte();
    other.serialize(&mut reader.share_reader(), &mut SerializeContext::default()).unwrap();
    assert_eq!(reader.attached_count(), 1);
    other.remove();
    assert_eq!(reader.attached_count(), 0);
}

#[test]
fn archive_teardown_invalidates_attachment() {
    let mut reader = saved_archive(&[8, 8, 8]);
    let mut bulk = BulkData::byte();
    bulk.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(bulk.is_attached());
    assert!(bulk.can_load_from_disk());

    drop(reader);
    // The handle is still held but no longer resolves, so the payload can
    // no longer be paged in from the archive.
    assert!(bulk.is_attached());
    assert!(!bulk.can_load_from_disk());
    // The payload itself was read inline at load time and is unaffected.
    assert_eq!(bulk.lock_read_only(), &[8, 8, 8]);
    bulk.unlock();
}

#[test]
fn attachment_survives_single_use_release_until_rw_lock() {
    let mut reader = saved_archive(&[3, 1, 4, 1, 5]);
    let mut bulk = BulkData::byte();
    bulk.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    bulk.set_flags(BulkDataFlags::SINGLE_USE);

    bulk.lock_read_only();
    bulk.unlock();
    assert!(!bulk.is_loaded());
    assert!(bulk.is_attached());

    // A read-write lock first pages the payload back in from the archive,
    // then detaches.
    let slice = bulk.lock(LockFlags::READ_WRITE);
    assert_eq!(slice, &[3, 1, 4, 1, 5]);
    bulk.clear_flags(BulkDataFlags::SINGLE_USE);
    bulk.unlock();
    assert!(!bulk.is_attached());
}
