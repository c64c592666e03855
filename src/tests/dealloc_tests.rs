use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use super::*;

/// Allocates three blocks that fill the first chunk exactly, so that the
/// free list is empty and every block is bounded by allocated blocks or
/// sentinels.
fn alloc_three_filling_the_chunk(allocator: &mut Allocator) -> (HeapPtr, HeapPtr, HeapPtr) {
    let x = alloc(allocator, 100);
    let y = alloc(allocator, 200);
    let z_block_size = DEFAULT_CHUNK_SIZE - 112 - 208;
    let z = alloc(allocator, z_block_size - DOUBLE_WORD_SIZE);

    assert_eq!(block_of(allocator, z).size, z_block_size);
    assert!(free_list_addrs(allocator).is_empty());
    assert_eq!(allocator.heap_size(), INIT_HEAP_SIZE);

    (x, y, z)
}

#[test]
fn dealloc_none_does_nothing() {
    let mut allocator = init_allocator();
    let before: Vec<BlockInfo> = allocator.blocks().collect();

    allocator.dealloc(None);

    assert_eq!(allocator.blocks().collect::<Vec<_>>(), before);
    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_prev_used_next_used() {
    let mut allocator = init_allocator();
    let (x, y, z) = alloc_three_filling_the_chunk(&mut allocator);

    dealloc(&mut allocator, y);

    // only the middle block is free, and it is the only node in the list.
    assert_only_1_free_block(&allocator, y.offset(), 208);
    assert!(block_of(&allocator, x).allocated);
    assert!(block_of(&allocator, z).allocated);
}

#[test]
fn dealloc_prev_used_next_free() {
    let mut allocator = init_allocator();

    let ptr = alloc(&mut allocator, 100);
    dealloc(&mut allocator, ptr);

    // merged with the remainder of the chunk that followed it.
    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_prev_free_next_used() {
    let mut allocator = init_allocator();
    let (x, y, z) = alloc_three_filling_the_chunk(&mut allocator);

    dealloc(&mut allocator, x);
    assert_only_1_free_block(&allocator, x.offset(), 112);

    dealloc(&mut allocator, y);

    // `y` was absorbed by `x`, which kept its place in the list.
    assert_only_1_free_block(&allocator, x.offset(), 112 + 208);
    assert!(block_of(&allocator, z).allocated);

    dealloc(&mut allocator, z);
    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_prev_free_next_free() {
    let mut allocator = init_allocator();
    let (x, y, z) = alloc_three_filling_the_chunk(&mut allocator);

    dealloc(&mut allocator, x);
    dealloc(&mut allocator, z);
    assert_eq!(free_list_addrs(&allocator), [x.offset(), z.offset()]);

    dealloc(&mut allocator, y);

    // all three became one block, represented by a single node.
    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_middle_then_outer_blocks() {
    let mut allocator = init_allocator();
    let (x, y, z) = alloc_three_filling_the_chunk(&mut allocator);

    dealloc(&mut allocator, y);
    assert_only_1_free_block(&allocator, y.offset(), 208);

    // merges with the next block, which is the head's only neighbour.
    dealloc(&mut allocator, x);
    assert_only_1_free_block(&allocator, x.offset(), 112 + 208);

    // merges with the previous block, which is the tail of the list.
    dealloc(&mut allocator, z);
    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_keeps_list_sorted_when_freeing_out_of_order() {
    let mut allocator = init_allocator();

    let ptrs: Vec<HeapPtr> = (0..8).map(|_| alloc(&mut allocator, 24)).collect();

    // free every other block, from the highest address down.
    for &ptr in ptrs.iter().step_by(2).rev() {
        dealloc(&mut allocator, ptr);
    }

    let mut expected: Vec<usize> = ptrs.iter().step_by(2).map(|ptr| ptr.offset()).collect();
    // the remainder of the chunk.
    expected.push(ptrs[7].offset() + 32);
    assert_eq!(free_list_addrs(&allocator), expected);
}

#[test]
fn alloc_then_dealloc_restores_the_heap() {
    let mut allocator = init_allocator();
    let kept = alloc(&mut allocator, 300);
    let freed = alloc(&mut allocator, 40);
    dealloc(&mut allocator, freed);

    let blocks_before: Vec<BlockInfo> = allocator.blocks().collect();
    let stats_before = assert_heap_consistent(&allocator);

    for size in [1, 8, 100, 1000, 3000, 20000] {
        let ptr = alloc(&mut allocator, size);
        let heap_size = allocator.heap_size();
        dealloc(&mut allocator, ptr);

        // a request that needed a heap extension leaves a larger last block,
        // otherwise the heap is back to exactly where it was.
        if heap_size == stats_before.heap_size {
            assert_eq!(allocator.blocks().collect::<Vec<_>>(), blocks_before);
            assert_eq!(assert_heap_consistent(&allocator), stats_before);
        }
    }

    assert!(block_of(&allocator, kept).allocated);
    let stats = assert_heap_consistent(&allocator);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.allocated_bytes, stats_before.allocated_bytes);
}

#[test]
fn dealloc_lots_of_allocations() {
    let mut allocator = init_allocator_with_capacity(INIT_HEAP_SIZE + DEFAULT_CHUNK_SIZE);

    let mut allocations = Vec::new();

    // allocate the entire heap
    while let Ok(Some(allocated)) = allocator.alloc(1) {
        allocations.push(allocated);
    }
    assert_eq!(allocations.len(), 2 * DEFAULT_CHUNK_SIZE / MIN_BLOCK_SIZE);
    assert!(free_list_addrs(&allocator).is_empty());

    for allocation in allocations {
        dealloc(&mut allocator, allocation);
    }

    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn dealloc_lots_of_allocations_dealloc_in_random_order() {
    let mut allocator = init_allocator_with_capacity(INIT_HEAP_SIZE + DEFAULT_CHUNK_SIZE);

    let mut allocations = Vec::new();

    // allocate the entire heap
    while let Ok(Some(allocated)) = allocator.alloc(1) {
        allocations.push(allocated);
    }

    let mut rng = rand::thread_rng();

    allocations.shuffle(&mut rng);

    for allocation in allocations {
        dealloc(&mut allocator, allocation);
    }

    assert_heap_is_1_free_block(&allocator);
}

#[test]
fn random_alloc_dealloc_realloc_keeps_heap_consistent() {
    struct Allocation {
        ptr: HeapPtr,
        size: usize,
        fill: u8,
    }

    fn assert_contents(allocator: &Allocator, allocation: &Allocation) {
        let payload = &allocator.payload(allocation.ptr)[..allocation.size];
        assert!(payload.iter().all(|&byte| byte == allocation.fill));
    }

    let mut allocator = init_allocator_with_capacity(DEFAULT_HEAP_CAPACITY);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut live: Vec<Allocation> = Vec::new();

    for step in 0..2000 {
        let fill = step as u8;
        match rng.gen_range(0..3) {
            0 if live.len() < 100 => {
                let size = rng.gen_range(1..=2000);
                let ptr = alloc(&mut allocator, size);
                allocator.payload_mut(ptr)[..size].fill(fill);
                live.push(Allocation { ptr, size, fill });
            },
            1 if !live.is_empty() => {
                let index = rng.gen_range(0..live.len());
                let allocation = live.swap_remove(index);
                assert_contents(&allocator, &allocation);
                dealloc(&mut allocator, allocation.ptr);
            },
            2 if !live.is_empty() => {
                let index = rng.gen_range(0..live.len());
                let new_size = rng.gen_range(1..=3000);
                let allocation = &mut live[index];

                let new_ptr = allocator
                    .realloc(Some(allocation.ptr), new_size)
                    .unwrap()
                    .unwrap();
                assert_heap_consistent(&allocator);

                // the data that fits survived the move.
                let kept = core::cmp::min(allocation.size, new_size);
                assert!(allocator.payload(new_ptr)[..kept]
                    .iter()
                    .all(|&byte| byte == allocation.fill));

                allocator.payload_mut(new_ptr)[..new_size].fill(fill);
                *allocation = Allocation {
                    ptr: new_ptr,
                    size: new_size,
                    fill,
                };
            },
            _ => continue,
        }

        for allocation in &live {
            assert_contents(&allocator, allocation);
        }
    }

    for allocation in live {
        dealloc(&mut allocator, allocation.ptr);
    }
    assert_heap_is_1_free_block(&allocator);
}
