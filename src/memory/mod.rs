//! Pooled sub-allocation of device memory
//!
//! Creating a device buffer is expensive compared to carving a range out of
//! one that already exists. Devices therefore allocate a few large heaps and
//! hand out power-of-two blocks from them with a buddy allocator.
//!
//! # Pattern
//!
//! 1. Allocate one large backing buffer per heap (power-of-two sized)
//! 2. Split it into buddy blocks on demand
//! 3. Coalesce blocks with their buddy when they are returned
//! 4. Fall back to a dedicated allocation when no heap can serve a request

pub mod block;
pub mod heap;

pub use block::{HeapBlock, SharedHeap};
pub use heap::{Block, BuddyHeap};
