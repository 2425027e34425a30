//! Read-only introspection types.
//!
//! These snapshots are diagnostic only: they are computed on demand, never
//! mutate allocator state, and must not be used to drive allocation
//! decisions.

use crate::allocator::TierKind;

/// Address span of one OS-backed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// Base address of the mapping.
    pub base: usize,
    /// Mapped length in bytes.
    pub len: usize,
}

/// Free/filled block counts for one tier, with its page list.
#[derive(Debug, Clone)]
pub struct TierStats {
    pub tier: TierKind,
    /// Blocks currently free (for the store, always 0).
    pub free_blocks: usize,
    /// Blocks currently allocated.
    pub filled_blocks: usize,
    /// Pages owned by the tier, in creation order.
    pub pages: Vec<PageSpan>,
}

/// One currently-allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address as returned to the caller.
    pub addr: usize,
    /// Usable payload size in bytes.
    pub size: usize,
}

/// Snapshot over every tier of the dispatcher.
#[derive(Debug, Clone)]
pub struct AllocatorStats {
    pub tiers: Vec<TierStats>,
}

impl AllocatorStats {
    /// Total allocated blocks across all tiers.
    #[must_use]
    pub fn filled_blocks(&self) -> usize {
        self.tiers.iter().map(|t| t.filled_blocks).sum()
    }

    /// Total free blocks across all tiers.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.tiers.iter().map(|t| t.free_blocks).sum()
    }
}
