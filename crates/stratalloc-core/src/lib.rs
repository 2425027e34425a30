//! # stratalloc-core
//!
//! A tiered dynamic memory allocator over raw virtual memory. Three
//! strategies cooperate behind one dispatching front end:
//!
//! - [`FixedSizePool`]: segregated pools for 16/32/64/128/256/512-byte
//!   requests, bump allocation plus an intrusive index-based free list.
//! - [`CoalescingArena`]: boundary-tagged first-fit allocation for
//!   mid-size requests, with eager coalescing of adjacent free blocks.
//! - [`LargeObjectStore`]: one OS mapping per request at or above the
//!   large-object threshold (10 MiB by default).
//!
//! [`TieredAllocator`] routes each `alloc` to exactly one tier by size and
//! routes each `free` by probing the tiers in a fixed order until one
//! claims ownership of the pointer.
//!
//! The design is single-threaded by construction: every operation takes
//! `&mut self`. No `unsafe` code is permitted in this crate; all memory
//! access goes through the bounds-checked offset accessors of
//! [`stratalloc_vm::Region`].

#![deny(unsafe_code)]

pub mod allocator;
pub mod coalesce;
pub mod large;
pub mod pool;
pub mod size_class;
pub mod stats;

pub use allocator::{AllocEvent, AllocatorConfig, EventLevel, TierKind, TieredAllocator};
pub use coalesce::CoalescingArena;
pub use large::LargeObjectStore;
pub use pool::FixedSizePool;
pub use size_class::{LARGE_THRESHOLD, POOL_CLASSES, Route};
pub use stats::{AllocatorStats, BlockInfo, PageSpan, TierStats};
pub use stratalloc_vm::VmError;
