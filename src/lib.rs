#![no_std]

//! This is a boundary tag memory allocator with an explicit free list,
//! managing a single simulated heap that only ever grows. Every block carries
//! its size and allocation state in both a header and a footer, which lets
//! the allocator reach both neighbours of a block in constant time. The free
//! blocks are threaded into a doubly linked list kept in ascending address
//! order, and a block that becomes free is immediately merged with any free
//! neighbour, so no two free blocks are ever adjacent.
//!
//! ## Heap layout
//!
//! ```text
//!   0     4          12         16         20    24
//!   ┌─────┬──────────┬──────────┬──────────┬─────┬───────────────────┬─────┐
//!   │ pad │ list head│ prologue │ prologue │ hdr │  blocks ...       │ epi │
//!   │     │prev│succ │  header  │  footer  │     │                   │     │
//!   └─────┴──────────┴──────────┴──────────┴─────┴───────────────────┴─────┘
//!                                                ▲                         ▲
//!                                       first payload                    brk
//! ```
//!
//! A free block keeps its free list links in the first two words of its
//! payload:
//!
//! ```text
//!   ┌────────┬───────────┬───────────┬─────────────────┬────────┐
//!   │ header │ prev_free │ succ_free │ unused ...      │ footer │
//!   └────────┴───────────┴───────────┴─────────────────┴────────┘
//! ```
//!
//! ## Usage
//!
//! ```
//! use explicit_alloc::{Allocator, HeapConfig};
//!
//! let mut allocator = Allocator::new(HeapConfig::default()).unwrap();
//!
//! let ptr = allocator.alloc(100).unwrap().unwrap();
//! allocator.payload_mut(ptr)[..5].copy_from_slice(b"hello");
//!
//! let ptr = allocator.realloc(Some(ptr), 200).unwrap().unwrap();
//! assert_eq!(&allocator.payload(ptr)[..5], b"hello");
//!
//! allocator.dealloc(Some(ptr));
//! ```
//!
//! ## Features
//!
//! - **`spin`**: Provides a `SpinLockedAllocator` type which takes a spinlock
//!   around every allocator operation.

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

mod alignment;
mod arena;
mod blocks;
mod boundary_tag;
mod check;
mod coalesce;
mod config;
mod error;
mod free_list;

#[cfg(test)]
mod tests;

use alignment::{align_down, align_up};
pub use arena::{Arena, ArenaError};
use blocks::{Block, HeapBlocks};
use boundary_tag::BoundaryTag;
pub use check::{HeapCheckError, HeapStats};
use coalesce::coalesce;
pub use config::{HeapConfig, DEFAULT_CHUNK_SIZE, DEFAULT_HEAP_CAPACITY};
pub use error::AllocError;
use free_list::FreeList;

/// The size of a boundary tag and of a free list link.
pub const WORD_SIZE: usize = 4;
pub const DOUBLE_WORD_SIZE: usize = 2 * WORD_SIZE;

/// Every payload address and every block size is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// The smallest block: a header, two free list links and a footer.
pub const MIN_BLOCK_SIZE: usize = 2 * DOUBLE_WORD_SIZE;

/// The largest size a 32-bit boundary tag can describe.
const MAX_BLOCK_SIZE: usize = align_down(u32::MAX as usize, ALIGNMENT);

/// Offset of the free list head sentinel, right after a padding word.
const FREE_LIST_HEAD: usize = WORD_SIZE;
const PROLOGUE_PAYLOAD: usize = 4 * WORD_SIZE;
const FIRST_BLOCK_PAYLOAD: usize = PROLOGUE_PAYLOAD + DOUBLE_WORD_SIZE;

/// The padding word, the free list head, the prologue and the epilogue.
const INITIAL_HEAP_SIZE: usize = 6 * WORD_SIZE;

/// A pointer to the payload of an allocated block, expressed as an offset into
/// the allocator's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
    fn from_block(block: Block) -> Self {
        Self(block.payload_addr())
    }

    fn block(self) -> Block {
        Block::from_payload(self.0)
    }

    /// The offset of the payload within the arena. Never 0, since the heap
    /// starts with the sentinels.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// A description of a single block in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// The offset of the block's payload within the arena.
    pub payload: usize,
    /// The size of the block, including its header and footer.
    pub size: usize,
    pub allocated: bool,
}

impl BlockInfo {
    fn of(arena: &Arena, block: Block) -> Self {
        let header = block.header(arena);
        Self {
            payload: block.payload_addr(),
            size: header.size(),
            allocated: header.is_allocated(),
        }
    }
}

/// A first-fit allocator over an explicit, address ordered free list.
///
/// The allocator is meant to have a single owner. Use the `spin` feature's
/// `SpinLockedAllocator` to share it.
#[derive(Debug)]
pub struct Allocator {
    arena: Arena,
    free_list: FreeList,
    chunk_size: usize,
}

impl Allocator {
    /// Creates an empty allocator without any heap, which will fail all
    /// allocation requests.
    ///
    /// To initialize this allocator, use the `init` method.
    pub const fn empty() -> Self {
        Self {
            arena: Arena::empty(),
            free_list: FreeList::new(FREE_LIST_HEAD),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Creates an allocator and initializes its heap.
    pub fn new(config: HeapConfig) -> Result<Self, AllocError> {
        let mut allocator = Self::empty();
        allocator.init(config)?;
        Ok(allocator)
    }

    /// Checks if the heap was already initialized by calling `init`.
    pub fn was_initialized(&self) -> bool {
        self.arena.size() != 0
    }

    /// Initializes the heap: reserves the arena, writes the free list head and
    /// the sentinel blocks, and extends the heap by one chunk which becomes
    /// the first free block.
    ///
    /// If initialization fails, the allocator stays empty.
    pub fn init(&mut self, config: HeapConfig) -> Result<(), AllocError> {
        if self.was_initialized() {
            return Err(AllocError::AlreadyInitialized);
        }
        config.validate()?;

        let mut heap = Self {
            arena: Arena::new(config.capacity),
            free_list: FreeList::new(FREE_LIST_HEAD),
            chunk_size: config.chunk_size,
        };

        let start = heap.arena.grow(INITIAL_HEAP_SIZE)?;
        debug_assert_eq!(start, 0);

        heap.arena.write_word(0, 0);
        heap.free_list.reset(&mut heap.arena);

        let prologue = Block::from_payload(PROLOGUE_PAYLOAD);
        prologue.set_tags(&mut heap.arena, BoundaryTag::PROLOGUE.size(), true);

        let epilogue = Block::from_payload(FIRST_BLOCK_PAYLOAD);
        epilogue.set_header(&mut heap.arena, BoundaryTag::EPILOGUE);

        heap.extend_heap(heap.chunk_size)?;

        log::debug!(
            "Allocator::init(capacity: {:#x}, chunk_size: {:#x}): heap is {:#x} bytes",
            config.capacity,
            config.chunk_size,
            heap.arena.size()
        );

        *self = heap;
        Ok(())
    }

    /// Computes the block size needed to hold `size` bytes of payload: the
    /// payload plus the header and footer, rounded up to the alignment, and
    /// never smaller than the minimum block size.
    ///
    /// Returns `None` if such a block can't be described by a boundary tag.
    fn adjusted_size(size: usize) -> Option<usize> {
        if size <= DOUBLE_WORD_SIZE {
            return Some(MIN_BLOCK_SIZE);
        }

        align_up(size.checked_add(DOUBLE_WORD_SIZE)?, ALIGNMENT)
            .filter(|&adjusted| adjusted <= MAX_BLOCK_SIZE)
    }

    /// Allocates a block with room for at least `size` bytes.
    ///
    /// Returns `Ok(None)` when `size` is 0. Fails with
    /// [`AllocError::OutOfMemory`] when the heap can't be extended enough.
    pub fn alloc(&mut self, size: usize) -> Result<Option<HeapPtr>, AllocError> {
        if size == 0 {
            return Ok(None);
        }

        self.alloc_nonzero(size).map(Some)
    }

    fn alloc_nonzero(&mut self, size: usize) -> Result<HeapPtr, AllocError> {
        if !self.was_initialized() {
            return Err(AllocError::Uninitialized);
        }

        let Some(block_size) = Self::adjusted_size(size) else {
            log::warn!("Allocator::alloc({size}): request is too large for any block");
            return Err(AllocError::OutOfMemory {
                requested: size,
                available: self.arena.remaining(),
            });
        };

        let block = match self.free_list.first_fit(&self.arena, block_size) {
            Some(block) => block,
            None => {
                let extend_size = core::cmp::max(block_size, self.chunk_size);
                self.extend_heap(extend_size)?
            },
        };

        self.place(block, block_size);

        log::trace!(
            "Allocator::alloc({size}) -> {:#x} (block size {block_size})",
            block.payload_addr()
        );

        Ok(HeapPtr::from_block(block))
    }

    /// Grows the heap by at least `size` bytes, turns the new region into a
    /// free block, and merges it with the last block of the heap if that one
    /// is free.
    ///
    /// Returns the resulting free block.
    fn extend_heap(&mut self, size: usize) -> Result<Block, AllocError> {
        let size = align_up(size, DOUBLE_WORD_SIZE).ok_or(AllocError::OutOfMemory {
            requested: size,
            available: self.arena.remaining(),
        })?;

        // the new block's header takes the place of the old epilogue.
        let start = self.arena.grow(size)?;
        let block = Block::from_payload(start);
        block.set_tags(&mut self.arena, size, false);

        let epilogue = block.next(&self.arena);
        epilogue.set_header(&mut self.arena, BoundaryTag::EPILOGUE);

        let coalesced = coalesce(&mut self.arena, &self.free_list, block);

        log::debug!(
            "Allocator::extend_heap({size:#x}): new free block {:#x}..{:#x} ({:?})",
            coalesced.block.payload_addr(),
            coalesced.block.payload_addr() + coalesced.size,
            coalesced.case,
        );

        Ok(coalesced.block)
    }

    /// Allocates `block_size` bytes at the start of the given free block,
    /// splitting off the rest as a new free block if it is large enough to be
    /// one.
    fn place(&mut self, block: Block, block_size: usize) {
        let arena = &mut self.arena;
        let free_size = block.size(arena);
        debug_assert!(free_size >= block_size);

        let leftover = free_size - block_size;
        if leftover >= MIN_BLOCK_SIZE {
            block.set_tags(arena, block_size, true);

            // the remainder directly follows the allocated part, so it takes
            // over the block's slot in the list.
            let remainder = block.next(arena);
            remainder.set_tags(arena, leftover, false);
            self.free_list.replace(arena, block, remainder);
        } else {
            // the leftover is too small to be a block, so it stays part of
            // this one.
            self.free_list.remove(arena, block);
            block.set_tags(arena, free_size, true);
        }
    }

    /// Frees the block pointed to by `ptr`, merging it with any free
    /// neighbour. Passing `None` does nothing.
    ///
    /// `ptr` must have been returned by this allocator and must not have been
    /// freed since.
    pub fn dealloc(&mut self, ptr: Option<HeapPtr>) {
        let Some(ptr) = ptr else {
            return;
        };

        let block = ptr.block();
        block.set_allocated(&mut self.arena, false);

        let coalesced = coalesce(&mut self.arena, &self.free_list, block);

        log::trace!(
            "Allocator::dealloc({:#x}): free block {:#x} of size {} ({:?})",
            ptr.offset(),
            coalesced.block.payload_addr(),
            coalesced.size,
            coalesced.case
        );
    }

    /// Resizes the block pointed to by `ptr` to hold `size` bytes.
    ///
    /// The data always moves to a newly allocated block: as much of it as fits
    /// is copied, then the old block is freed. With `None` this behaves like
    /// `alloc`, and with a size of 0 like `dealloc`, returning `Ok(None)`.
    ///
    /// If the new block can't be allocated, the old one is left untouched.
    pub fn realloc(
        &mut self,
        ptr: Option<HeapPtr>,
        size: usize,
    ) -> Result<Option<HeapPtr>, AllocError> {
        let Some(old_ptr) = ptr else {
            return self.alloc(size);
        };

        if size == 0 {
            self.dealloc(Some(old_ptr));
            return Ok(None);
        }

        // TODO: grow in place when the next block is free and large enough.
        let new_ptr = self.alloc_nonzero(size)?;

        let old_payload_size = old_ptr.block().payload_size(&self.arena);
        let copy_size = core::cmp::min(old_payload_size, size);
        self.arena
            .copy_within(old_ptr.offset(), new_ptr.offset(), copy_size);

        self.dealloc(Some(old_ptr));

        log::trace!(
            "Allocator::realloc({:#x}, {size}) -> {:#x}, copied {copy_size} bytes",
            old_ptr.offset(),
            new_ptr.offset()
        );

        Ok(Some(new_ptr))
    }

    /// The amount of payload bytes the block pointed to by `ptr` can hold,
    /// which is at least the size it was allocated with.
    pub fn usable_size(&self, ptr: HeapPtr) -> usize {
        ptr.block().payload_size(&self.arena)
    }

    /// The payload of the block pointed to by `ptr`.
    pub fn payload(&self, ptr: HeapPtr) -> &[u8] {
        self.arena.bytes(ptr.offset(), self.usable_size(ptr))
    }

    pub fn payload_mut(&mut self, ptr: HeapPtr) -> &mut [u8] {
        let size = self.usable_size(ptr);
        self.arena.bytes_mut(ptr.offset(), size)
    }

    /// The amount of bytes the heap took from the arena so far.
    pub fn heap_size(&self) -> usize {
        self.arena.size()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// All the blocks of the heap in address order, sentinels excluded.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        // an empty allocator has no heap to walk.
        let first = self
            .was_initialized()
            .then(|| HeapBlocks::new(&self.arena, Block::from_payload(FIRST_BLOCK_PAYLOAD)));
        first
            .into_iter()
            .flatten()
            .map(|block| BlockInfo::of(&self.arena, block))
    }

    /// The free blocks in free list order, which is ascending address order.
    pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let list = self
            .was_initialized()
            .then(|| self.free_list.iter(&self.arena));
        list.into_iter()
            .flatten()
            .map(|block| BlockInfo::of(&self.arena, block))
    }

    /// Walks the heap and the free list and verifies all of their invariants.
    pub fn check_heap(&self) -> Result<HeapStats, HeapCheckError> {
        if !self.was_initialized() {
            return Ok(HeapStats::default());
        }
        check::check_heap(&self.arena, &self.free_list)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::empty()
    }
}

/// An allocator protected by a spinlock, which is taken around every
/// operation, so that the tag and free list updates of one call are never
/// observed halfway by another.
#[cfg(feature = "spin")]
pub struct SpinLockedAllocator(spin::Mutex<Allocator>);

#[cfg(feature = "spin")]
impl SpinLockedAllocator {
    /// Creates an empty locked allocator without any heap.
    ///
    /// To initialize it, use the `init` method.
    pub const fn empty() -> Self {
        Self(spin::Mutex::new(Allocator::empty()))
    }

    /// Initializes the heap. See [`Allocator::init`].
    pub fn init(&self, config: HeapConfig) -> Result<(), AllocError> {
        let mut allocator = self.0.lock();
        allocator.init(config)
    }

    /// Checks if the heap was already initialized by calling init.
    pub fn was_initialized(&self) -> bool {
        let allocator = self.0.lock();
        allocator.was_initialized()
    }

    pub fn alloc(&self, size: usize) -> Result<Option<HeapPtr>, AllocError> {
        let mut allocator = self.0.lock();
        allocator.alloc(size)
    }

    pub fn dealloc(&self, ptr: Option<HeapPtr>) {
        let mut allocator = self.0.lock();
        allocator.dealloc(ptr)
    }

    pub fn realloc(&self, ptr: Option<HeapPtr>, size: usize) -> Result<Option<HeapPtr>, AllocError> {
        let mut allocator = self.0.lock();
        allocator.realloc(ptr, size)
    }

    /// Locks the allocator, for accessing payloads or inspecting the heap.
    pub fn lock(&self) -> spin::MutexGuard<'_, Allocator> {
        self.0.lock()
    }
}
