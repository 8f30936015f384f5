// Integration tests for copy-out semantics.
//
// Coverage:
//   - copy into a caller-supplied buffer, with and without discard
//   - discard only releases the internal copy when it can be re-read
//   - move-out path when the destination slot is empty and the payload is
//     reloadable
//   - direct load into the destination when the payload is not resident

use bulkdata::{
    BulkData, LockFlags, MemoryArchive, PayloadBuffer, SerializeContext, DEFAULT_ALIGNMENT,
};

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn copy_into_supplied_buffer_keeps_internal_copy() {
    let mut bulk = byte_bulk(&[1, 2, 3]);
    let mut dest = Some(PayloadBuffer::alloc(3, DEFAULT_ALIGNMENT));
    bulk.get_copy(&mut dest, false);
    assert_eq!(dest.unwrap().as_slice(), &[1, 2, 3]);
    assert!(bulk.is_loaded());
}

#[test]
fn discard_without_backing_keeps_internal_copy() {
    // The payload only exists in memory; discarding it would lose it.
    let mut bulk = byte_bulk(&[4, 5]);
    let mut dest = Some(PayloadBuffer::alloc(2, DEFAULT_ALIGNMENT));
    bulk.get_copy(&mut dest, true);
    assert_eq!(dest.unwrap().as_slice(), &[4, 5]);
    assert!(bulk.is_loaded());
}

#[test]
fn discard_with_attached_archive_releases_internal_copy() {
    let mut bulk = byte_bulk(&[6, 7, 8]);
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    reader.set_lazy_loading(true);
    let mut loaded = BulkData::byte();
    loaded.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(loaded.is_attached());

    let mut dest = Some(PayloadBuffer::alloc(3, DEFAULT_ALIGNMENT));
    loaded.get_copy(&mut dest, true);
    assert_eq!(dest.unwrap().as_slice(), &[6, 7, 8]);
    assert!(!loaded.is_loaded());

    // And it pages back in from the attachment on demand.
    assert_eq!(loaded.lock_read_only(), &[6, 7, 8]);
    loaded.unlock();
}

#[test]
fn empty_slot_with_attachment_moves_payload_out() {
    let mut bulk = byte_bulk(&[9, 10, 11, 12]);
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let mut reader = writer.into_reader();
    reader.set_lazy_loading(true);
    let mut loaded = BulkData::byte();
    loaded.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    let mut dest = None;
    loaded.get_copy(&mut dest, true);
    assert_eq!(dest.unwrap().as_slice(), &[9, 10, 11, 12]);
    assert!(!loaded.is_loaded());
}

#[test]
fn empty_slot_without_discard_allocates_a_copy() {
    let mut bulk = byte_bulk(&[13, 14]);
    let mut dest = None;
    bulk.get_copy(&mut dest, false);
    let out = dest.unwrap();
    assert_eq!(out.as_slice(), &[13, 14]);
    assert!(out.owns_memory());
    assert!(bulk.is_loaded());
}

#[test]
fn non_resident_payload_loads_straight_into_destination() {
    // Lazy end-of-file payload: resident only on demand.
    let mut bulk = byte_bulk(&[15, 16, 17]);
    let mut linker = bulkdata::LinkerSave::new();
    let mut writer = MemoryArchive::writer();
    {
        let mut ctx = SerializeContext { linker_save: Some(&mut linker), ..Default::default() };
        bulk.serialize(&mut writer, &mut ctx).unwrap();
    }
    linker.finalize(&mut writer).unwrap();

    let mut reader = writer.into_reader();
    reader.set_lazy_loading(true);
    let mut loaded = BulkData::byte();
    loaded.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(!loaded.is_loaded(), "end-of-file payload must defer under lazy loading");

    let mut dest = None;
    loaded.get_copy(&mut dest, false);
    assert_eq!(dest.unwrap().as_slice(), &[15, 16, 17]);
}

#[test]
#[should_panic(expected = "locked")]
fn get_copy_while_locked_traps() {
    let mut bulk = byte_bulk(&[1]);
    bulk.lock_read_only();
    let mut dest = None;
    bulk.get_copy(&mut dest, false);
}
