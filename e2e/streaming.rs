// End-to-end: background streaming of a large inline payload.
//
// A single test body drives every phase so the process-wide knobs (cooked
// mode, foreground designation, stream threshold) are never contended by
// parallel test threads.
//
// Coverage:
//   - an inline payload above the threshold streams: serialize returns
//     with the cursor past the payload and the data not yet resident
//   - first access harvests the fetch and yields the right bytes
//   - FORCE_STREAM_PAYLOAD streams a payload below the threshold
//   - payloads at or below the threshold load synchronously

use std::io::Write;

use bulkdata::{
    config, Archive, BulkData, BulkDataFlags, FileReaderArchive, LockFlags, MemoryArchive,
    SerializeContext,
};

const HEADER_SIZE: i64 = 20;

fn save_to_file(bulk: &mut BulkData, path: &std::path::Path) {
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&writer.bytes()).unwrap();
}

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn streaming_load_lifecycle() {
    config::designate_foreground_thread();
    config::set_requires_cooked_data(true);

    let dir = tempfile::tempdir().unwrap();

    // Phase 1: payload above the default 131072-byte threshold streams.
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i.wrapping_mul(31) % 251) as u8).collect();
    let mut bulk = byte_bulk(&payload);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);
    let path = dir.path().join("large.pak");
    save_to_file(&mut bulk, &path);

    let mut reader = FileReaderArchive::open(&path, false).unwrap();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();

    // The cursor advanced as if the payload had been read, but the data is
    // not resident until the fetch is harvested.
    assert_eq!(reader.tell(), HEADER_SIZE + 200_000);
    assert!(!restored.is_loaded());

    // First access blocks on the fetch and hands the payload over.
    let data = restored.lock_read_only();
    assert_eq!(data, &payload[..]);
    restored.unlock();
    assert!(restored.is_loaded());
    assert!(restored.is_async_loading_complete());

    // Phase 2: FORCE_STREAM_PAYLOAD streams even a tiny payload.
    let small = [1u8, 2, 3, 4];
    let mut bulk = byte_bulk(&small);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD | BulkDataFlags::FORCE_STREAM_PAYLOAD);
    let path = dir.path().join("forced.pak");
    save_to_file(&mut bulk, &path);

    let mut reader = FileReaderArchive::open(&path, false).unwrap();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert_eq!(reader.tell(), HEADER_SIZE + 4);
    assert!(!restored.is_loaded());
    assert_eq!(restored.lock_read_only(), &small);
    restored.unlock();

    // Phase 3: at or below the threshold, the load is synchronous.
    let mut bulk = byte_bulk(&small);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);
    let path = dir.path().join("small.pak");
    save_to_file(&mut bulk, &path);

    let mut reader = FileReaderArchive::open(&path, false).unwrap();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(restored.is_loaded());
    assert_eq!(restored.lock_read_only(), &small);
    restored.unlock();

    // Phase 4: a negative threshold disables streaming outright.
    config::set_min_stream_size(-1);
    let mut bulk = byte_bulk(&small);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD | BulkDataFlags::FORCE_STREAM_PAYLOAD);
    let path = dir.path().join("disabled.pak");
    save_to_file(&mut bulk, &path);

    let mut reader = FileReaderArchive::open(&path, false).unwrap();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    assert!(restored.is_loaded());
    config::set_min_stream_size(config::DEFAULT_MIN_STREAM_SIZE);

    // Phase 5: a streamed instance dropped before harvest drains cleanly.
    let mut bulk = byte_bulk(&payload);
    bulk.set_flags(BulkDataFlags::FORCE_INLINE_PAYLOAD);
    let path = dir.path().join("dropped.pak");
    save_to_file(&mut bulk, &path);

    let mut reader = FileReaderArchive::open(&path, false).unwrap();
    let mut restored = BulkData::byte();
    restored.serialize(&mut reader, &mut SerializeContext::default()).unwrap();
    drop(restored);

    config::set_requires_cooked_data(false);
}
