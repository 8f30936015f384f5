// Integration tests for the usage-tracking table driven through the real
// serialize path, and for the dump_usage report format.
//
// Tracking state is process-wide, so everything runs in one test body.

use bulkdata::{
    dump_usage, tracking, BulkData, LockFlags, MemoryArchive, OwnerTag, SerializeContext,
};

fn byte_bulk(len: usize, fill: u8) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    let slice = bulk.realloc(len as i32);
    slice.fill(fill);
    bulk.unlock();
    bulk
}

#[test]
fn tracking_lifecycle_through_serialize() {
    tracking::set_enabled(true);

    let mut texture = byte_bulk(4096, 0xAA);
    let mut sound = byte_bulk(2048, 0xBB);

    let mut ar = MemoryArchive::writer();
    let mut ctx = SerializeContext {
        owner: Some(OwnerTag::new("Texture2D /Game/Bricks.Bricks", "Texture2D")),
        ..Default::default()
    };
    texture.serialize(&mut ar, &mut ctx).unwrap();
    let mut ctx = SerializeContext {
        owner: Some(OwnerTag::new("SoundWave /Game/Thud.Thud", "SoundWave")),
        ..Default::default()
    };
    sound.serialize(&mut ar, &mut ctx).unwrap();
    assert_eq!(tracking::tracked_count(), 2);

    let mut out = Vec::new();
    dump_usage(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Per class summary of bulk data use:"), "{}", text);
    assert!(text.contains("4 KByte of bulk data for class Texture2D"), "{}", text);
    assert!(text.contains("2 KByte of bulk data for class SoundWave"), "{}", text);
    assert!(text.contains("/Game/Bricks.Bricks"), "{}", text);

    // Releasing a payload drops it from the report but not the table.
    sound.remove();
    let mut out = Vec::new();
    dump_usage(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains("SoundWave"), "{}", text);
    assert_eq!(tracking::tracked_count(), 2);

    // Destruction unregisters.
    drop(texture);
    drop(sound);
    assert_eq!(tracking::tracked_count(), 0);

    // Disabled tracking reports that fact instead of an empty table.
    tracking::set_enabled(false);
    let mut out = Vec::new();
    dump_usage(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("disabled"), "{}", text);
}
