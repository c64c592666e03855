//! The simulated heap region that the allocator carves blocks out of.
//!
//! The arena reserves its whole capacity up front and hands it out through
//! [`Arena::grow`], which behaves like `sbrk`: it moves the break forward and
//! returns the offset where the new region starts. The arena never shrinks,
//! and offsets it has handed out stay valid for its entire lifetime.

use alloc::{vec, vec::Vec};
use core::fmt;

use crate::WORD_SIZE;

/// An error returned when the arena can't grow any further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    /// Growing by `requested` bytes would move the break past the capacity.
    Exhausted { requested: usize, available: usize },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted {
                requested,
                available,
            } => write!(
                f,
                "arena exhausted: requested {} bytes, but only {} are available",
                requested, available
            ),
        }
    }
}

impl core::error::Error for ArenaError {}

/// A fixed capacity, contiguous, grow-only byte region.
#[derive(Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    brk: usize,
}

impl Arena {
    /// Creates an arena with no capacity, on which every `grow` fails.
    pub const fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            brk: 0,
        }
    }

    /// Reserves a region of `capacity` bytes. Nothing is handed out until
    /// the first call to [`Arena::grow`].
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            brk: 0,
        }
    }

    /// Extends the used part of the arena by `incr` bytes and returns the
    /// offset at which the new region starts.
    ///
    /// Either the whole increment is granted or nothing is.
    pub fn grow(&mut self, incr: usize) -> Result<usize, ArenaError> {
        let available = self.remaining();
        if incr > available {
            log::warn!(
                "Arena::grow({incr}): out of memory, only {available} bytes left of {}",
                self.capacity()
            );
            return Err(ArenaError::Exhausted {
                requested: incr,
                available,
            });
        }

        let old_brk = self.brk;
        self.brk += incr;
        Ok(old_brk)
    }

    /// The amount of bytes handed out so far, which is also the offset one
    /// past the last usable byte.
    pub fn size(&self) -> usize {
        self.brk
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The amount of bytes that `grow` can still hand out.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.brk
    }

    /// The part of the region that was handed out. Every access goes through
    /// this, so reading or writing past the break panics.
    fn used(&self) -> &[u8] {
        &self.bytes[..self.brk]
    }

    fn used_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.brk]
    }

    /// Reads the word at the given offset.
    pub fn read_word(&self, addr: usize) -> u32 {
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(&self.used()[addr..addr + WORD_SIZE]);
        u32::from_ne_bytes(word)
    }

    /// Writes the word at the given offset.
    pub fn write_word(&mut self, addr: usize, value: u32) {
        self.used_mut()[addr..addr + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn bytes(&self, addr: usize, len: usize) -> &[u8] {
        &self.used()[addr..addr + len]
    }

    pub fn bytes_mut(&mut self, addr: usize, len: usize) -> &mut [u8] {
        &mut self.used_mut()[addr..addr + len]
    }

    /// Copies `len` bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.used_mut().copy_within(src..src + len, dst);
    }
}
