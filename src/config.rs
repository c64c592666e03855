use crate::{alignment::is_aligned, AllocError, ALIGNMENT, MIN_BLOCK_SIZE};

/// The default amount of bytes the heap is extended by when no free block
/// fits a request.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

/// The default capacity of the arena backing the heap.
pub const DEFAULT_HEAP_CAPACITY: usize = 20 * (1 << 20);

/// The configuration of an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// The amount of bytes the arena reserves, and thus the most the heap can
    /// ever grow to. Must fit in a `u32`, since free list links are 32-bit.
    pub capacity: usize,

    /// The least amount of bytes the heap is extended by at a time. Must be a
    /// multiple of the alignment and hold at least one minimal block.
    pub chunk_size: usize,
}

impl HeapConfig {
    pub const fn new() -> Self {
        Self {
            capacity: DEFAULT_HEAP_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Checks that the allocator can work with this configuration.
    pub fn validate(&self) -> Result<(), AllocError> {
        if self.capacity > u32::MAX as usize {
            return Err(AllocError::InvalidConfig {
                reason: "capacity must fit in a 32-bit offset",
            });
        }
        if !is_aligned(self.chunk_size, ALIGNMENT) {
            return Err(AllocError::InvalidConfig {
                reason: "chunk size must be a multiple of the alignment",
            });
        }
        if self.chunk_size < MIN_BLOCK_SIZE {
            return Err(AllocError::InvalidConfig {
                reason: "chunk size must be at least the minimum block size",
            });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HeapConfig::default();
        assert_eq!(config.capacity, 20 * 1024 * 1024);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_chunk_sizes() {
        assert!(matches!(
            HeapConfig::new().with_chunk_size(100).validate(),
            Err(AllocError::InvalidConfig { .. })
        ));
        assert!(matches!(
            HeapConfig::new().with_chunk_size(8).validate(),
            Err(AllocError::InvalidConfig { .. })
        ));
        assert_eq!(HeapConfig::new().with_chunk_size(16).validate(), Ok(()));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn rejects_capacity_beyond_32_bit_offsets() {
        assert!(matches!(
            HeapConfig::new().with_capacity(1 << 33).validate(),
            Err(AllocError::InvalidConfig { .. })
        ));
    }
}
