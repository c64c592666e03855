use crate::{arena::Arena, blocks::Block, free_list::FreeList};

/// Which neighbours a block was merged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceCase {
    /// Both neighbours are allocated; the block is linked on its own.
    Isolated,
    /// The next block was free and got absorbed.
    MergedNext,
    /// The previous block was free and absorbed this one.
    MergedPrev,
    /// Both neighbours were free; all three became one block.
    MergedBoth,
}

/// The free block that a call to [`coalesce`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coalesced {
    pub block: Block,
    pub size: usize,
    pub case: CoalesceCase,
}

/// Merges a block that just became free with its free neighbours, and makes
/// sure that exactly one free list node represents the merged region.
///
/// The block's tags must already say it is free. It must either be unlinked,
/// or already be a maximal free block, in which case nothing changes.
pub fn coalesce(arena: &mut Arena, free_list: &FreeList, block: Block) -> Coalesced {
    debug_assert!(!block.is_allocated(arena));
    debug_assert_eq!(block.header(arena), block.footer(arena));

    let prev_allocated = block.prev_footer(arena).is_allocated();
    let next = block.next(arena);
    let next_allocated = next.header(arena).is_allocated();
    let mut size = block.size(arena);

    let coalesced = match (prev_allocated, next_allocated) {
        (true, true) => {
            free_list.insert(arena, block);
            Coalesced {
                block,
                size,
                case: CoalesceCase::Isolated,
            }
        }
        (true, false) => {
            // the merged block starts where this block starts, which is right
            // before `next`, so it can take over `next`'s slot in the list.
            size += next.size(arena);
            free_list.replace(arena, next, block);
            block.set_tags(arena, size, false);
            Coalesced {
                block,
                size,
                case: CoalesceCase::MergedNext,
            }
        }
        (false, true) => {
            // `prev` keeps its node, only its size changes.
            let prev = block.prev(arena);
            size += prev.size(arena);
            prev.set_tags(arena, size, false);
            Coalesced {
                block: prev,
                size,
                case: CoalesceCase::MergedPrev,
            }
        }
        (false, false) => {
            let prev = block.prev(arena);
            size += prev.size(arena) + next.size(arena);
            free_list.remove(arena, next);
            prev.set_tags(arena, size, false);
            Coalesced {
                block: prev,
                size,
                case: CoalesceCase::MergedBoth,
            }
        }
    };

    debug_assert_eq!(
        coalesced.block.header(arena),
        coalesced.block.footer(arena)
    );

    coalesced
}
