//! Buddy-system sub-allocator over one power-of-two backing allocation
//!
//! A heap of `2^max_order` bytes is split into power-of-two blocks. Each order
//! keeps its own free list; allocation pops from the smallest non-empty order
//! at or above the request and splits down, freeing coalesces with the buddy
//! (`offset ^ (1 << order)`) for as long as the buddy is free.
//!
//! Free blocks plus live blocks always partition `[0, size)` exactly.
//!
//! # Thread Safety
//!
//! `BuddyHeap` has no internal locking. The device wraps every heap in a
//! `Mutex` (see [`crate::memory::SharedHeap`]).

use std::collections::BTreeSet;

use crate::error::{ForgeError, ForgeResult};

/// A live block handed out by [`BuddyHeap::alloc`].
///
/// Deliberately neither `Clone` nor `Copy`: a block can be returned to its
/// heap only once.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    offset: usize,
    order: u32,
}

impl Block {
    /// Byte offset from the start of the heap
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// log2 of the block size
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Block size in bytes (`2^order`)
    pub fn byte_size(&self) -> usize {
        1usize << self.order
    }
}

/// Buddy heap over a backing buffer `B`
#[derive(Debug)]
pub struct BuddyHeap<B> {
    /// Backing allocation (host bytes or a device buffer)
    buffer: B,
    /// Total size in bytes, always a power of two
    size: usize,
    min_order: u32,
    max_order: u32,
    /// Free block offsets, indexed by order
    free_lists: Vec<BTreeSet<usize>>,
    allocated: usize,
    live_blocks: usize,
}

impl<B> BuddyHeap<B> {
    /// Create a heap over `buffer` covering `size` bytes.
    ///
    /// # Errors
    /// - `InvalidHeapSize` if `size` is not an exact power of two
    pub fn new(buffer: B, size: usize, min_order: u32) -> ForgeResult<Self> {
        if !size.is_power_of_two() {
            return Err(ForgeError::InvalidHeapSize(size));
        }

        let max_order = size.trailing_zeros();
        let mut free_lists = vec![BTreeSet::new(); max_order as usize + 1];
        free_lists[max_order as usize].insert(0);

        Ok(Self {
            buffer,
            size,
            min_order,
            max_order,
            free_lists,
            allocated: 0,
            live_blocks: 0,
        })
    }

    /// Allocate a block of at least `requested` bytes.
    ///
    /// Returns `None` when no free block exists at or above the required
    /// order. That is an ordinary outcome: callers fall back to another heap
    /// or to a direct allocation.
    pub fn alloc(&mut self, requested: usize) -> Option<Block> {
        let order = Self::order_for(requested)?.max(self.min_order);
        if order > self.max_order {
            return None;
        }

        let found = (order..=self.max_order).find(|&o| !self.free_lists[o as usize].is_empty())?;
        let offset = self.free_lists[found as usize].pop_first()?;

        // Keep the lower half, hand the upper half of every split to the free list.
        let mut current = found;
        while current > order {
            current -= 1;
            let buddy = offset ^ (1usize << current);
            self.free_lists[current as usize].insert(buddy);
        }

        self.allocated += 1usize << order;
        self.live_blocks += 1;

        tracing::trace!(
            "BuddyHeap alloc {} bytes -> offset {} order {} (split from order {})",
            requested,
            offset,
            order,
            found
        );

        Some(Block { offset, order })
    }

    /// Return a block to the heap, coalescing with free buddies.
    pub fn free(&mut self, block: Block) {
        let Block { mut offset, mut order } = block;
        debug_assert!(offset + (1usize << order) <= self.size);

        self.allocated -= 1usize << order;
        self.live_blocks -= 1;

        while order < self.max_order {
            let buddy = offset ^ (1usize << order);
            if !self.free_lists[order as usize].remove(&buddy) {
                break;
            }
            offset = offset.min(buddy);
            order += 1;
        }

        tracing::trace!("BuddyHeap free -> offset {} order {}", offset, order);
        self.free_lists[order as usize].insert(offset);
    }

    /// Smallest order whose block holds `requested` bytes, `None` on overflow
    fn order_for(requested: usize) -> Option<u32> {
        requested
            .max(1)
            .checked_next_power_of_two()
            .map(|size| size.trailing_zeros())
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Total heap size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn min_order(&self) -> u32 {
        self.min_order
    }

    pub fn max_order(&self) -> u32 {
        self.max_order
    }

    /// Bytes held by live blocks (after power-of-two rounding)
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    pub fn free_bytes(&self) -> usize {
        self.size - self.allocated
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Free `(offset, order)` pairs, smallest order first
    pub fn free_blocks(&self) -> Vec<(usize, u32)> {
        self.free_lists
            .iter()
            .enumerate()
            .flat_map(|(order, list)| list.iter().map(move |&offset| (offset, order as u32)))
            .collect()
    }

    /// Size of the largest block that can currently be allocated
    pub fn largest_free_block(&self) -> usize {
        self.free_lists
            .iter()
            .rposition(|list| !list.is_empty())
            .map(|order| 1usize << order)
            .unwrap_or(0)
    }

    /// 0.0 = all free memory in one block, towards 1.0 = scattered
    pub fn fragmentation(&self) -> f32 {
        let free = self.free_bytes();
        if free == 0 {
            return 0.0;
        }
        1.0 - (self.largest_free_block() as f32 / free as f32)
    }
}
