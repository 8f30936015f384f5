// Integration tests for the resource-memory hook: payloads landing in
// pre-allocated, externally-owned buffers the engine must never free.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::Cell;
use std::ptr::NonNull;

use bulkdata::{
    BulkData, BulkDataFlags, LockFlags, MemoryArchive, OwnerTag, PayloadBuffer,
    ResourceMemoryProvider, SerializeContext,
};

/// Hands out one externally-owned buffer, then `None`.
struct OneShotPool {
    ptr: NonNull<u8>,
    size: usize,
    align: usize,
    handed_out: Cell<bool>,
}

impl OneShotPool {
    fn new(size: usize, align: usize) -> OneShotPool {
        let layout = Layout::from_size_align(size, align).unwrap();
        let raw = unsafe { alloc_zeroed(layout) };
        OneShotPool {
            ptr: NonNull::new(raw).expect("pool allocation failed"),
            size,
            align,
            handed_out: Cell::new(false),
        }
    }
}

impl ResourceMemoryProvider for OneShotPool {
    fn resource_memory(&self, _owner: Option<&OwnerTag>, _index: u32) -> Option<PayloadBuffer> {
        if self.handed_out.replace(true) {
            return None;
        }
        // SAFETY: the pool allocation outlives the test body and is handed
        // out at most once.
        Some(unsafe { PayloadBuffer::from_external(self.ptr, self.size, self.align) })
    }
}

impl Drop for OneShotPool {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.size, self.align).unwrap();
        // SAFETY: allocated with this exact layout in new().
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

fn byte_bulk(bytes: &[u8]) -> BulkData {
    let mut bulk = BulkData::byte();
    bulk.lock(LockFlags::READ_WRITE);
    bulk.realloc(bytes.len() as i32).copy_from_slice(bytes);
    bulk.unlock();
    bulk
}

#[test]
fn inline_load_lands_in_resource_memory() {
    let payload = [0xA0u8, 0xA1, 0xA2, 0xA3];
    let mut bulk = byte_bulk(&payload);
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let pool = OneShotPool::new(4, 64);
    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    let mut ctx = SerializeContext { resource_memory: Some(&pool), ..Default::default() };
    restored.serialize(&mut reader, &mut ctx).unwrap();

    // The payload went straight into the pool's memory.
    assert!(restored.is_loaded());
    let view = unsafe { std::slice::from_raw_parts(pool.ptr.as_ptr(), 4) };
    assert_eq!(view, &payload);
    assert_eq!(restored.lock_read_only(), &payload);
    restored.unlock();
}

#[test]
fn single_use_release_does_not_free_resource_memory() {
    let payload = [1u8, 2, 3, 4];
    let mut bulk = byte_bulk(&payload);
    bulk.set_flags(BulkDataFlags::SINGLE_USE);
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let pool = OneShotPool::new(4, 16);
    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    let mut ctx = SerializeContext { resource_memory: Some(&pool), ..Default::default() };
    restored.serialize(&mut reader, &mut ctx).unwrap();

    restored.lock_read_only();
    restored.unlock();
    assert!(!restored.is_loaded());

    // The pool still owns the memory and can read the delivered bytes.
    let view = unsafe { std::slice::from_raw_parts(pool.ptr.as_ptr(), 4) };
    assert_eq!(view, &payload);
}

#[test]
#[should_panic(expected = "external allocator")]
fn realloc_over_resource_memory_traps() {
    let payload = [5u8, 6];
    let mut bulk = byte_bulk(&payload);
    let mut writer = MemoryArchive::writer();
    bulk.serialize(&mut writer, &mut SerializeContext::default()).unwrap();

    let pool = OneShotPool::new(2, 16);
    let mut reader = writer.into_reader();
    let mut restored = BulkData::byte();
    let mut ctx = SerializeContext { resource_memory: Some(&pool), ..Default::default() };
    restored.serialize(&mut reader, &mut ctx).unwrap();

    restored.lock(LockFlags::READ_WRITE);
    restored.realloc(8);
}
