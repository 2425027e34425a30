//! Pass-through store for very large requests.
//!
//! Every allocation at or above the large-object threshold gets its own
//! OS mapping of exactly the requested size. The store only keeps a
//! tracking table of live regions; there is no sub-allocation, no
//! metadata inside the mapping, and no reuse after release.

use stratalloc_vm::Region;

use crate::stats::{BlockInfo, PageSpan, TierStats};

/// One fresh OS region per request, tracked until released.
///
/// The table has no ordering invariant; entries are removed by
/// swap-with-last, so release is a linear scan plus O(1) removal.
#[derive(Default)]
pub struct LargeObjectStore {
    regions: Vec<Region>,
}

impl LargeObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live large allocations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.regions.len()
    }

    /// Total bytes currently mapped by the store.
    #[must_use]
    pub fn total_mapped(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    /// Maps a fresh region of exactly `size` bytes and records it.
    /// Returns `None` if the OS cannot supply the mapping.
    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        let region = Region::map(size).ok()?;
        let base = region.base();
        self.regions.push(region);
        Some(base)
    }

    /// Releases the region whose base address is `addr`.
    ///
    /// Returns `false` when no tracked region starts at `addr`; an
    /// address in the middle of a mapping is not accepted.
    pub fn free(&mut self, addr: usize) -> bool {
        match self.regions.iter().position(|r| r.base() == addr) {
            Some(index) => {
                // Dropping the region releases the mapping.
                self.regions.swap_remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn stats(&self) -> TierStats {
        TierStats {
            tier: crate::allocator::TierKind::Store,
            free_blocks: 0,
            filled_blocks: self.regions.len(),
            pages: self
                .regions
                .iter()
                .map(|r| PageSpan {
                    base: r.base(),
                    len: r.len(),
                })
                .collect(),
        }
    }

    /// Appends every live large allocation to `out`.
    pub fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        for region in &self.regions {
            out.push(BlockInfo {
                addr: region.base(),
                size: region.len(),
            });
        }
    }
}
