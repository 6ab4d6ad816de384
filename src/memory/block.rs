//! Owned handle to a block carved out of a shared buddy heap
//!
//! A `HeapBlock` returns its block to the originating heap exactly once:
//! either through [`HeapBlock::release`] or when the handle is dropped. It
//! keeps only a weak reference to the heap, so a heap torn down together with
//! its device does not stay alive through outstanding storages.

use std::sync::{Arc, Mutex, Weak};

use super::heap::{Block, BuddyHeap};
use crate::error::ForgeResult;

/// Heap shared between a device and the storages carved from it
pub type SharedHeap<B> = Arc<Mutex<BuddyHeap<B>>>;

/// Block of a shared heap, plus a handle to the heap's backing buffer
#[derive(Debug)]
pub struct HeapBlock<B> {
    heap: Weak<Mutex<BuddyHeap<B>>>,
    buffer: B,
    offset: usize,
    order: u32,
    block: Option<Block>,
}

impl<B: Clone> HeapBlock<B> {
    /// Try to carve `byte_size` bytes out of `heap`.
    ///
    /// `Ok(None)` means the heap has no suitable free block.
    pub fn allocate(heap: &SharedHeap<B>, byte_size: usize) -> ForgeResult<Option<Self>> {
        let mut guard = heap.lock()?;
        let Some(block) = guard.alloc(byte_size) else {
            return Ok(None);
        };

        Ok(Some(Self {
            heap: Arc::downgrade(heap),
            buffer: guard.buffer().clone(),
            offset: block.offset(),
            order: block.order(),
            block: Some(block),
        }))
    }
}

impl<B> HeapBlock<B> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Size of the whole block, at least the requested size
    pub fn byte_size(&self) -> usize {
        1usize << self.order
    }

    /// Backing buffer of the heap this block lives in
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Whether this block was carved from `heap`
    pub fn belongs_to(&self, heap: &SharedHeap<B>) -> bool {
        Weak::ptr_eq(&self.heap, &Arc::downgrade(heap))
    }

    /// Return the block to its heap now.
    pub fn release(mut self) -> ForgeResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> ForgeResult<()> {
        let Some(block) = self.block.take() else {
            return Ok(());
        };
        // Heap already gone: its whole backing allocation went with it.
        if let Some(heap) = self.heap.upgrade() {
            heap.lock()?.free(block);
        }
        Ok(())
    }
}

impl<B> Drop for HeapBlock<B> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::error!(
                "Failed to return block at offset {} to heap: {}",
                self.offset,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(size: usize) -> SharedHeap<()> {
        Arc::new(Mutex::new(BuddyHeap::new((), size, 0).unwrap()))
    }

    #[test]
    fn test_drop_returns_block() {
        let heap = shared(64);
        {
            let block = HeapBlock::allocate(&heap, 16).unwrap().unwrap();
            assert_eq!(block.byte_size(), 16);
            assert!(block.belongs_to(&heap));
            assert_eq!(heap.lock().unwrap().live_blocks(), 1);
        }
        let heap = heap.lock().unwrap();
        assert_eq!(heap.live_blocks(), 0);
        assert_eq!(heap.free_blocks(), vec![(0, 6)]);
    }

    #[test]
    fn test_explicit_release() {
        let heap = shared(64);
        let block = HeapBlock::allocate(&heap, 64).unwrap().unwrap();
        assert!(HeapBlock::allocate(&heap, 1).unwrap().is_none());
        block.release().unwrap();
        assert!(HeapBlock::allocate(&heap, 64).unwrap().is_some());
    }

    #[test]
    fn test_block_outlives_heap() {
        let heap = shared(64);
        let block = HeapBlock::allocate(&heap, 8).unwrap().unwrap();
        drop(heap);
        block.release().unwrap();
    }

    #[test]
    fn test_block_carries_buffer() {
        let heap: SharedHeap<String> =
            Arc::new(Mutex::new(BuddyHeap::new("backing".to_string(), 32, 0).unwrap()));
        let block = HeapBlock::allocate(&heap, 4).unwrap().unwrap();
        assert_eq!(block.buffer(), "backing");
        let other = shared(32);
        let foreign = HeapBlock::allocate(&other, 4).unwrap().unwrap();
        assert_eq!(foreign.offset(), 0);
        assert_eq!(block.offset(), 0);
    }
}
