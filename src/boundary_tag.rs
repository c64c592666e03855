use crate::ALIGNMENT;

/// The low bits of a tag that are never part of the size, because every size
/// is a multiple of [`ALIGNMENT`].
const FLAG_BITS: u32 = ALIGNMENT as u32 - 1;

const ALLOCATED_BIT: u32 = 1;

/// A boundary tag, the word stored at both ends of a block. The block size is
/// a multiple of 8, which leaves the 3 low bits free; the lowest one stores
/// whether the block is allocated.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTag(u32);

impl BoundaryTag {
    /// The tag of the prologue block: a header and a footer with no payload.
    pub const PROLOGUE: Self = Self::new(crate::DOUBLE_WORD_SIZE, true);

    /// The tag of the epilogue, the zero sized block ending the heap.
    pub const EPILOGUE: Self = Self::new(0, true);

    /// Packs the given size and allocation state into a tag.
    ///
    /// `size` must be a multiple of [`ALIGNMENT`] and fit in a `u32`.
    pub const fn new(size: usize, allocated: bool) -> Self {
        debug_assert!(size & FLAG_BITS as usize == 0);
        debug_assert!(size <= crate::MAX_BLOCK_SIZE);
        Self(size as u32 | allocated as u32)
    }

    /// Reinterprets a raw word read from the heap as a tag.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw word to store in the heap.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The size of the block, including its header and footer.
    pub const fn size(self) -> usize {
        (self.0 & !FLAG_BITS) as usize
    }

    pub const fn is_allocated(self) -> bool {
        self.0 & ALLOCATED_BIT != 0
    }

    /// Sets whether the block is allocated, without changing its size.
    pub fn set_allocated(&mut self, allocated: bool) {
        self.0 = (self.0 | ALLOCATED_BIT) ^ u32::from(!allocated)
    }
}
