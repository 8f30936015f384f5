// Integration tests for the lock state machine and its quantified
// invariants.
//
// Coverage:
//   - set_flags / clear_flags identity for arbitrary flag subsets
//   - lock(RW) + realloc(n) + unlock leaves count = n and size = n * elem
//   - SINGLE_USE release keeps element_count intact
//   - illegal transitions trap (double lock, stray unlock, realloc
//     without a read-write lock, unknown lock flags)

use bulkdata::{BulkData, BulkDataFlags, LockFlags, LockStatus};

#[test]
fn flag_set_clear_identity_over_subsets() {
    let subsets = [
        BulkDataFlags::empty(),
        BulkDataFlags::SINGLE_USE,
        BulkDataFlags::SERIALIZE_COMPRESSED_ZLIB | BulkDataFlags::UNUSED,
        BulkDataFlags::FORCE_INLINE_PAYLOAD
            | BulkDataFlags::FORCE_STREAM_PAYLOAD
            | BulkDataFlags::PAYLOAD_AT_END_OF_FILE,
        BulkDataFlags::all(),
    ];
    for base in subsets {
        for toggled in subsets {
            let mut bulk = BulkData::byte();
            bulk.set_flags(base);
            let original = bulk.flags();
            bulk.set_flags(toggled);
            bulk.clear_flags(toggled & !base);
            assert_eq!(bulk.flags(), original, "base={:?} toggled={:?}", base, toggled);
        }
    }
}

#[test]
fn realloc_sets_count_and_size_for_every_width() {
    for (bulk, element_size) in [
        (BulkData::byte(), 1usize),
        (BulkData::word(), 2),
        (BulkData::int32(), 4),
        (BulkData::float32(), 4),
    ] {
        let mut bulk = bulk;
        for n in [0i32, 1, 7, 64] {
            bulk.lock(LockFlags::READ_WRITE);
            bulk.realloc(n);
            bulk.unlock();
            assert_eq!(bulk.element_count(), n);
            assert_eq!(bulk.size(), n as usize * element_size);
        }
    }
}

#[test]
fn lock_states_transition_as_documented() {
    let mut bulk = BulkData::byte();
    assert_eq!(bulk.lock_status(), LockStatus::Unlocked);

    bulk.lock(LockFlags::READ_WRITE);
    assert_eq!(bulk.lock_status(), LockStatus::ReadWrite);
    bulk.realloc(4);
    assert_eq!(bulk.lock_status(), LockStatus::ReadWrite);
    bulk.unlock();
    assert_eq!(bulk.lock_status(), LockStatus::Unlocked);

    bulk.lock_read_only();
    assert_eq!(bulk.lock_status(), LockStatus::ReadOnly);
    bulk.unlock();

    // Combined flags resolve to read-write.
    bulk.lock(LockFlags::READ_ONLY | LockFlags::READ_WRITE);
    assert_eq!(bulk.lock_status(), LockStatus::ReadWrite);
    bulk.unlock();
}

#[test]
fn single_use_release_preserves_element_count() {
    let mut bulk = BulkData::word();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(16);
    bulk.unlock();
    bulk.set_flags(BulkDataFlags::SINGLE_USE);

    bulk.lock_read_only();
    bulk.unlock();
    assert!(!bulk.is_loaded());
    assert_eq!(bulk.element_count(), 16);
    assert_eq!(bulk.size(), 32);
}

#[test]
fn writes_through_lock_are_visible_to_the_next_lock() {
    let mut bulk = BulkData::byte();
    let slice = bulk.lock(LockFlags::READ_WRITE);
    assert!(slice.is_empty());
    let slice = bulk.realloc(3);
    slice.copy_from_slice(&[11, 22, 33]);
    bulk.unlock();

    assert_eq!(bulk.lock_read_only(), &[11, 22, 33]);
    bulk.unlock();
}

#[test]
#[should_panic(expected = "already locked")]
fn double_read_write_lock_traps() {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.lock(LockFlags::READ_WRITE);
}

#[test]
#[should_panic(expected = "not locked")]
fn stray_unlock_traps() {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.unlock();
    bulk.unlock();
}

#[test]
#[should_panic(expected = "read-write lock")]
fn realloc_after_unlock_traps() {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.unlock();
    bulk.realloc(8);
}

#[test]
#[should_panic(expected = "unknown lock flags")]
fn lock_with_no_mode_traps() {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::empty());
}
