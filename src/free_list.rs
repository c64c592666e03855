//! The explicit free list: a doubly linked list threaded through the payloads
//! of the free blocks, kept in ascending address order.
//!
//! Every node is two words. For a free block the node sits at the start of
//! its payload, and for the head sentinel it sits at a fixed offset in the
//! heap that no block ever covers:
//!
//! ```text
//!   node + 0: prev_free   (offset of the previous node, the head for the first block)
//!   node + 4: succ_free   (offset of the next block, or NULL at the tail)
//! ```

use crate::{arena::Arena, blocks::Block, WORD_SIZE};

/// The link value marking the end of the list. Offset 0 is padding at the very
/// start of the heap, so no node can live there.
pub const NULL: usize = 0;

/// The free list, identified by the offset of its head sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    head: usize,
}

impl FreeList {
    pub const fn new(head: usize) -> Self {
        Self { head }
    }

    /// The offset of the head sentinel.
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Writes an empty list into the head sentinel.
    pub fn reset(&self, arena: &mut Arena) {
        set_prev(arena, self.head, NULL);
        set_succ(arena, self.head, NULL);
    }

    /// The free block with the lowest address, if any.
    pub fn first(&self, arena: &Arena) -> Option<Block> {
        as_block(succ(arena, self.head))
    }

    /// The free block following `block` in the list.
    pub fn succ_of(&self, arena: &Arena, block: Block) -> Option<Block> {
        as_block(succ(arena, block.payload_addr()))
    }

    /// The raw `prev_free` link of `block`, which is either the head or the
    /// offset of another free block.
    pub fn prev_link(&self, arena: &Arena, block: Block) -> usize {
        prev(arena, block.payload_addr())
    }

    /// Links `block` into the list, right before the first free block with a
    /// higher address.
    ///
    /// Inserting a block that is already linked leaves the list unchanged.
    pub fn insert(&self, arena: &mut Arena, block: Block) {
        let addr = block.payload_addr();

        let mut cursor = self.head;
        let mut next = succ(arena, cursor);
        while next != NULL && next < addr {
            cursor = next;
            next = succ(arena, cursor);
        }

        if next == addr {
            return;
        }

        link_between(arena, addr, cursor, next);
    }

    /// Unlinks `block` from the list.
    pub fn remove(&self, arena: &mut Arena, block: Block) {
        // change the state:
        // ```
        // prev <-> block <-> succ
        // ```
        // to the state:
        // ```
        // prev <-> succ
        // ```
        let addr = block.payload_addr();
        let prev_node = prev(arena, addr);
        let succ_node = succ(arena, addr);

        set_succ(arena, prev_node, succ_node);
        if succ_node != NULL {
            set_prev(arena, succ_node, prev_node);
        }
    }

    /// Moves the list slot of `old` over to `new`, without scanning.
    ///
    /// The caller must make sure that no free block lies between the two, so
    /// that `new` ends up in the same position in address order.
    pub fn replace(&self, arena: &mut Arena, old: Block, new: Block) {
        let old_addr = old.payload_addr();
        let prev_node = prev(arena, old_addr);
        let succ_node = succ(arena, old_addr);

        link_between(arena, new.payload_addr(), prev_node, succ_node);
    }

    /// Returns the first free block, in address order, whose size is at least
    /// `min_size`.
    pub fn first_fit(&self, arena: &Arena, min_size: usize) -> Option<Block> {
        self.iter(arena).find(|block| block.size(arena) >= min_size)
    }

    /// An iterator over the free blocks, from the head onwards.
    pub fn iter<'a>(&self, arena: &'a Arena) -> FreeBlocks<'a> {
        FreeBlocks {
            arena,
            cur: succ(arena, self.head),
        }
    }
}

/// Links the node at `addr` between `prev_node` and `succ_node`, patching
/// both neighbours to point at it.
fn link_between(arena: &mut Arena, addr: usize, prev_node: usize, succ_node: usize) {
    set_prev(arena, addr, prev_node);
    set_succ(arena, addr, succ_node);
    set_succ(arena, prev_node, addr);
    if succ_node != NULL {
        set_prev(arena, succ_node, addr);
    }
}

fn as_block(addr: usize) -> Option<Block> {
    (addr != NULL).then(|| Block::from_payload(addr))
}

fn prev(arena: &Arena, node: usize) -> usize {
    arena.read_word(node) as usize
}

fn succ(arena: &Arena, node: usize) -> usize {
    arena.read_word(node + WORD_SIZE) as usize
}

fn set_prev(arena: &mut Arena, node: usize, value: usize) {
    arena.write_word(node, to_link(value));
}

fn set_succ(arena: &mut Arena, node: usize, value: usize) {
    arena.write_word(node + WORD_SIZE, to_link(value));
}

fn to_link(addr: usize) -> u32 {
    // the arena's capacity is capped so that every offset fits in a link.
    debug_assert!(addr <= u32::MAX as usize);
    addr as u32
}

/// An iterator over the blocks of a [`FreeList`].
pub struct FreeBlocks<'a> {
    arena: &'a Arena,
    cur: usize,
}

impl Iterator for FreeBlocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = as_block(self.cur)?;
        self.cur = succ(self.arena, self.cur);
        Some(block)
    }
}
