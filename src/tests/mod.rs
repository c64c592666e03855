mod dealloc_tests;

use std::vec::Vec;

use super::*;

/// A capacity large enough for every test that doesn't exhaust the heap.
const TEST_CAPACITY: usize = 1 << 20;

/// The size of the heap right after `init`: the sentinels and one chunk.
const INIT_HEAP_SIZE: usize = INITIAL_HEAP_SIZE + DEFAULT_CHUNK_SIZE;

/// Creates an allocator with the default chunk size and a test sized arena.
fn init_allocator() -> Allocator {
    init_allocator_with_capacity(TEST_CAPACITY)
}

fn init_allocator_with_capacity(capacity: usize) -> Allocator {
    Allocator::new(HeapConfig::new().with_capacity(capacity)).unwrap()
}

/// Allocates `size` bytes, which must succeed, and checks the heap afterwards.
fn alloc(allocator: &mut Allocator, size: usize) -> HeapPtr {
    let ptr = allocator
        .alloc(size)
        .unwrap()
        .expect("a non zero allocation must return a pointer");
    assert_heap_consistent(allocator);
    ptr
}

/// Frees `ptr` and checks the heap afterwards.
fn dealloc(allocator: &mut Allocator, ptr: HeapPtr) {
    allocator.dealloc(Some(ptr));
    assert_heap_consistent(allocator);
}

fn assert_heap_consistent(allocator: &Allocator) -> HeapStats {
    match allocator.check_heap() {
        Ok(stats) => stats,
        Err(err) => panic!("heap is inconsistent: {err}"),
    }
}

/// Returns the block that `ptr` points into.
fn block_of(allocator: &Allocator, ptr: HeapPtr) -> BlockInfo {
    allocator
        .blocks()
        .find(|block| block.payload == ptr.offset())
        .expect("the pointer must point at the start of a block")
}

fn free_list_addrs(allocator: &Allocator) -> Vec<usize> {
    allocator.free_blocks().map(|block| block.payload).collect()
}

/// Asserts that the free list holds a single block, starting at `payload`
/// and spanning `size` bytes.
fn assert_only_1_free_block(allocator: &Allocator, payload: usize, size: usize) {
    let free_blocks: Vec<BlockInfo> = allocator.free_blocks().collect();
    assert_eq!(
        free_blocks,
        [BlockInfo {
            payload,
            size,
            allocated: false
        }]
    );

    let stats = assert_heap_consistent(allocator);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, size);
}

/// Asserts that the whole heap is a single free block.
fn assert_heap_is_1_free_block(allocator: &Allocator) {
    let heap_size = allocator.heap_size();
    assert_only_1_free_block(
        allocator,
        FIRST_BLOCK_PAYLOAD,
        heap_size - INITIAL_HEAP_SIZE,
    );
    assert_eq!(allocator.blocks().count(), 1);
}
