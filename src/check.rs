//! A heap consistency checker, which walks every block and every free list
//! node and verifies the invariants the allocator relies on.

use alloc::vec::Vec;
use core::fmt;

use crate::{
    alignment::is_aligned, arena::Arena, blocks::Block, boundary_tag::BoundaryTag,
    free_list::FreeList, ALIGNMENT, FIRST_BLOCK_PAYLOAD, MIN_BLOCK_SIZE, PROLOGUE_PAYLOAD,
};

/// Statistics collected while checking the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// The amount of bytes taken from the arena, sentinels included.
    pub heap_size: usize,
    /// The amount of blocks between the prologue and the epilogue.
    pub blocks: usize,
    pub free_blocks: usize,
    /// The total size of the free blocks, tags included.
    pub free_bytes: usize,
    /// The total size of the allocated blocks, tags included.
    pub allocated_bytes: usize,
}

/// An inconsistency found by [`check_heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCheckError {
    BadPrologue { header: u32, footer: u32 },
    BadEpilogue { addr: usize, tag: u32 },
    MisalignedPayload { addr: usize },
    BadBlockSize { addr: usize, size: usize },
    BlockOverrunsHeap { addr: usize, size: usize, heap_size: usize },
    TagMismatch { addr: usize, header: u32, footer: u32 },
    /// Two free blocks are adjacent, so a coalesce was missed.
    UncoalescedNeighbours { first: usize, second: usize },
    FreeListOutOfOrder { prev: usize, next: usize },
    /// A free list node doesn't point at the start of any block.
    StrayFreeListNode { addr: usize },
    AllocatedBlockInFreeList { addr: usize },
    BrokenBackLink { addr: usize, expected: usize, found: usize },
    /// A free block that can't be reached from the free list head.
    NotInFreeList { addr: usize },
}

impl fmt::Display for HeapCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BadPrologue { header, footer } => write!(
                f,
                "bad prologue: header {:#x}, footer {:#x}",
                header, footer
            ),
            Self::BadEpilogue { addr, tag } => {
                write!(f, "bad epilogue at {:#x}: tag {:#x}", addr, tag)
            },
            Self::MisalignedPayload { addr } => {
                write!(f, "payload at {:#x} is not aligned to {}", addr, ALIGNMENT)
            },
            Self::BadBlockSize { addr, size } => {
                write!(f, "block at {:#x} has an invalid size of {}", addr, size)
            },
            Self::BlockOverrunsHeap {
                addr,
                size,
                heap_size,
            } => write!(
                f,
                "block at {:#x} of size {} runs past the end of the heap at {:#x}",
                addr, size, heap_size
            ),
            Self::TagMismatch {
                addr,
                header,
                footer,
            } => write!(
                f,
                "block at {:#x}: header {:#x} doesn't match footer {:#x}",
                addr, header, footer
            ),
            Self::UncoalescedNeighbours { first, second } => write!(
                f,
                "adjacent free blocks at {:#x} and {:#x} were not coalesced",
                first, second
            ),
            Self::FreeListOutOfOrder { prev, next } => write!(
                f,
                "free list is not in address order: {:#x} is followed by {:#x}",
                prev, next
            ),
            Self::StrayFreeListNode { addr } => {
                write!(f, "free list node {:#x} is not a block", addr)
            },
            Self::AllocatedBlockInFreeList { addr } => {
                write!(f, "allocated block at {:#x} is in the free list", addr)
            },
            Self::BrokenBackLink {
                addr,
                expected,
                found,
            } => write!(
                f,
                "free block at {:#x} links back to {:#x} instead of {:#x}",
                addr, found, expected
            ),
            Self::NotInFreeList { addr } => {
                write!(f, "free block at {:#x} is missing from the free list", addr)
            },
        }
    }
}

impl core::error::Error for HeapCheckError {}

/// Checks the whole heap: the sentinels, the tags of every block, that no two
/// free blocks are adjacent, and that the free list holds exactly the free
/// blocks in ascending address order with consistent back links.
pub fn check_heap(arena: &Arena, free_list: &FreeList) -> Result<HeapStats, HeapCheckError> {
    let heap_size = arena.size();

    // the prologue's footer is read through the first block, so that a broken
    // prologue header can't move it.
    let first = Block::from_payload(FIRST_BLOCK_PAYLOAD);
    let prologue_header = Block::from_payload(PROLOGUE_PAYLOAD).header(arena);
    let prologue_footer = first.prev_footer(arena);
    if prologue_header != BoundaryTag::PROLOGUE || prologue_footer != BoundaryTag::PROLOGUE {
        return Err(HeapCheckError::BadPrologue {
            header: prologue_header.raw(),
            footer: prologue_footer.raw(),
        });
    }

    let mut stats = HeapStats {
        heap_size,
        ..HeapStats::default()
    };

    // (payload address, allocated) of every block, in address order.
    let mut blocks: Vec<(usize, bool)> = Vec::new();
    let mut prev_free: Option<usize> = None;
    let mut cur = first;

    loop {
        let addr = cur.payload_addr();
        let header = cur.header(arena);

        if header.size() == 0 {
            // the epilogue must be the last word of the heap.
            if !header.is_allocated() || addr != heap_size {
                return Err(HeapCheckError::BadEpilogue {
                    addr,
                    tag: header.raw(),
                });
            }
            break;
        }

        let size = header.size();
        if !is_aligned(addr, ALIGNMENT) {
            return Err(HeapCheckError::MisalignedPayload { addr });
        }
        if size < MIN_BLOCK_SIZE || !is_aligned(size, ALIGNMENT) {
            return Err(HeapCheckError::BadBlockSize { addr, size });
        }
        // the block must leave room for at least the epilogue's header.
        if addr + size > heap_size {
            return Err(HeapCheckError::BlockOverrunsHeap {
                addr,
                size,
                heap_size,
            });
        }

        let footer = cur.footer(arena);
        if footer != header {
            return Err(HeapCheckError::TagMismatch {
                addr,
                header: header.raw(),
                footer: footer.raw(),
            });
        }

        stats.blocks += 1;
        if header.is_allocated() {
            stats.allocated_bytes += size;
            prev_free = None;
        } else {
            if let Some(first) = prev_free {
                return Err(HeapCheckError::UncoalescedNeighbours {
                    first,
                    second: addr,
                });
            }
            stats.free_blocks += 1;
            stats.free_bytes += size;
            prev_free = Some(addr);
        }
        blocks.push((addr, header.is_allocated()));

        cur = cur.next(arena);
    }

    check_free_list(arena, free_list, &blocks, &stats)?;

    Ok(stats)
}

fn check_free_list(
    arena: &Arena,
    free_list: &FreeList,
    blocks: &[(usize, bool)],
    stats: &HeapStats,
) -> Result<(), HeapCheckError> {
    let mut prev_node = free_list.head();
    let mut listed = 0;
    let mut cur = free_list.first(arena);

    // every node is validated before its links are followed, and the list
    // must be strictly ascending, so a cycle or a wild link ends the walk.
    while let Some(block) = cur {
        let addr = block.payload_addr();

        if prev_node != free_list.head() && addr <= prev_node {
            return Err(HeapCheckError::FreeListOutOfOrder {
                prev: prev_node,
                next: addr,
            });
        }

        match blocks.binary_search_by_key(&addr, |&(block_addr, _)| block_addr) {
            Err(_) => return Err(HeapCheckError::StrayFreeListNode { addr }),
            Ok(index) if blocks[index].1 => {
                return Err(HeapCheckError::AllocatedBlockInFreeList { addr })
            },
            Ok(_) => {},
        }

        let back_link = free_list.prev_link(arena, block);
        if back_link != prev_node {
            return Err(HeapCheckError::BrokenBackLink {
                addr,
                expected: prev_node,
                found: back_link,
            });
        }

        listed += 1;
        prev_node = addr;
        cur = free_list.succ_of(arena, block);
    }

    // every listed node is a distinct free block, so a shortfall means some
    // free block was dropped from the list.
    if listed != stats.free_blocks {
        let mut listed_addrs = free_list.iter(arena).map(Block::payload_addr).peekable();
        for &(addr, allocated) in blocks {
            if allocated {
                continue;
            }
            if listed_addrs.peek() == Some(&addr) {
                listed_addrs.next();
            } else {
                return Err(HeapCheckError::NotInFreeList { addr });
            }
        }
    }

    Ok(())
}
