use crate::{arena::Arena, boundary_tag::BoundaryTag, DOUBLE_WORD_SIZE, WORD_SIZE};

/// A block in the heap, identified by the offset of its payload.
///
/// A block is laid out as `[header | payload | footer]`, where the header and
/// the footer hold the same [`BoundaryTag`]. The tag's size covers the whole
/// block, header and footer included.
///
/// None of the navigation methods check bounds on their own. They rely on the
/// prologue and epilogue to stop any walk before it leaves the heap, and on
/// the arena to panic if that ever goes wrong.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
    /// Returns the block whose payload starts at the given offset.
    pub const fn from_payload(addr: usize) -> Self {
        Self(addr)
    }

    /// The offset where the payload of this block starts.
    pub const fn payload_addr(self) -> usize {
        self.0
    }

    /// The offset of this block's header.
    pub const fn header_addr(self) -> usize {
        self.0 - WORD_SIZE
    }

    pub fn header(self, arena: &Arena) -> BoundaryTag {
        BoundaryTag::from_raw(arena.read_word(self.header_addr()))
    }

    /// The offset of this block's footer, derived from the size currently
    /// stored in the header.
    pub fn footer_addr(self, arena: &Arena) -> usize {
        self.0 + self.size(arena) - DOUBLE_WORD_SIZE
    }

    pub fn footer(self, arena: &Arena) -> BoundaryTag {
        BoundaryTag::from_raw(arena.read_word(self.footer_addr(arena)))
    }

    /// The size of this block, including the header and the footer.
    pub fn size(self, arena: &Arena) -> usize {
        self.header(arena).size()
    }

    /// The amount of payload bytes the block can hold.
    pub fn payload_size(self, arena: &Arena) -> usize {
        self.size(arena) - DOUBLE_WORD_SIZE
    }

    pub fn is_allocated(self, arena: &Arena) -> bool {
        self.header(arena).is_allocated()
    }

    /// The block right after this one in memory.
    pub fn next(self, arena: &Arena) -> Block {
        Block(self.0 + self.size(arena))
    }

    /// The footer of the block right before this one in memory, which sits
    /// one word before this block's header.
    pub fn prev_footer(self, arena: &Arena) -> BoundaryTag {
        BoundaryTag::from_raw(arena.read_word(self.0 - DOUBLE_WORD_SIZE))
    }

    /// The block right before this one in memory.
    pub fn prev(self, arena: &Arena) -> Block {
        Block(self.0 - self.prev_footer(arena).size())
    }

    /// Writes only the header of this block. Used for the epilogue, which has
    /// no footer.
    pub fn set_header(self, arena: &mut Arena, tag: BoundaryTag) {
        arena.write_word(self.header_addr(), tag.raw());
    }

    /// Writes the header, then the footer at the position implied by the new
    /// size.
    pub fn set_tags(self, arena: &mut Arena, size: usize, allocated: bool) {
        let tag = BoundaryTag::new(size, allocated);
        self.set_header(arena, tag);
        arena.write_word(self.footer_addr(arena), tag.raw());
    }

    /// Flips the allocation state of this block in both of its tags, keeping
    /// its size.
    pub fn set_allocated(self, arena: &mut Arena, allocated: bool) {
        let mut tag = self.header(arena);
        tag.set_allocated(allocated);
        self.set_header(arena, tag);
        arena.write_word(self.footer_addr(arena), tag.raw());
    }
}

/// An iterator over all the blocks of the heap in address order, from the
/// first block after the prologue up to, but excluding, the epilogue.
pub struct HeapBlocks<'a> {
    arena: &'a Arena,
    cur: Block,
}

impl<'a> HeapBlocks<'a> {
    /// Walks the heap starting at `first`.
    pub fn new(arena: &'a Arena, first: Block) -> Self {
        Self { arena, cur: first }
    }
}

impl Iterator for HeapBlocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        // the epilogue is the only block with a size of 0.
        if self.cur.size(self.arena) == 0 {
            return None;
        }

        let block = self.cur;
        self.cur = block.next(self.arena);
        Some(block)
    }
}
