//! Fixed-size pools.
//!
//! One pool serves exactly one block size. Each page is a single OS
//! mapping carved into `blocks_per_page` uniform blocks. Never-touched
//! blocks are handed out by a bump cursor; freed blocks go onto an
//! index-based free list whose "next" link is stored in the freed block's
//! first four payload bytes, so free blocks carry no separate metadata.

use fixedbitset::FixedBitSet;
use stratalloc_vm::{ALIGN, Region, VmError};

use crate::stats::{BlockInfo, PageSpan, TierStats};

/// Free-list terminator / empty-list sentinel.
const NO_BLOCK: u32 = u32::MAX;

struct PoolPage {
    region: Region,
    /// Head of the index-based free list, [`NO_BLOCK`] when empty.
    free_head: u32,
    /// Bump cursor: blocks below this index have been handed out at least
    /// once; blocks at or above it have never been touched.
    initialized: u32,
    /// Currently allocated blocks on this page.
    filled: u32,
    /// Allocated bit per block; cleared on free. Checked on release so a
    /// double free is rejected instead of corrupting the free list.
    allocated: FixedBitSet,
}

impl PoolPage {
    fn map(block_size: usize, blocks_per_page: usize) -> Result<Self, VmError> {
        let region = Region::map(block_size * blocks_per_page)?;
        Ok(Self {
            region,
            free_head: NO_BLOCK,
            initialized: 0,
            filled: 0,
            allocated: FixedBitSet::with_capacity(blocks_per_page),
        })
    }
}

/// Allocator for uniform-size blocks of one size class.
///
/// Pages grow monotonically and are only released when the pool is
/// dropped. Allocation is O(1); release scans the page list to find the
/// owning page, then is O(1).
pub struct FixedSizePool {
    block_size: usize,
    blocks_per_page: usize,
    pages: Vec<PoolPage>,
}

impl FixedSizePool {
    /// Creates the pool and maps its first page.
    ///
    /// `block_size` must be a multiple of the alignment boundary and at
    /// least 4 bytes (the in-payload free-list link).
    pub fn new(block_size: usize, blocks_per_page: usize) -> Result<Self, VmError> {
        assert!(
            block_size >= size_of::<u32>() && block_size % ALIGN == 0 && blocks_per_page > 0,
            "unusable pool geometry: block_size {block_size}, blocks_per_page {blocks_per_page}"
        );
        let first = PoolPage::map(block_size, blocks_per_page)?;
        Ok(Self {
            block_size,
            blocks_per_page,
            pages: vec![first],
        })
    }

    /// Block size served by this pool.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of pages currently mapped.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns the address of a free block of exactly `block_size` bytes,
    /// or `None` if the OS cannot supply a new page.
    ///
    /// Per page, in list order: pop the free list if non-empty, else
    /// advance the bump cursor, else move on, appending a fresh page at
    /// the tail when every existing page is full.
    pub fn alloc(&mut self) -> Option<usize> {
        let mut index = 0;
        loop {
            if index == self.pages.len() {
                let page = PoolPage::map(self.block_size, self.blocks_per_page).ok()?;
                self.pages.push(page);
            }
            let page = &mut self.pages[index];

            if page.free_head != NO_BLOCK {
                let block = page.free_head as usize;
                let offset = block * self.block_size;
                page.free_head = page.region.read_u32(offset);
                page.filled += 1;
                page.allocated.set(block, true);
                return Some(page.region.base() + offset);
            }

            if (page.initialized as usize) < self.blocks_per_page {
                let block = page.initialized as usize;
                page.initialized += 1;
                page.filled += 1;
                page.allocated.set(block, true);
                return Some(page.region.base() + block * self.block_size);
            }

            index += 1;
        }
    }

    /// Releases a block previously returned by [`alloc`](Self::alloc).
    ///
    /// Returns `false` without mutating any state when `addr` is not
    /// owned by this pool: outside every page, misaligned, not on a block
    /// boundary, never handed out, or already free.
    pub fn free(&mut self, addr: usize) -> bool {
        for page in &mut self.pages {
            if !page.region.contains(addr) {
                continue;
            }
            let offset = addr - page.region.base();
            if addr % ALIGN != 0 || offset % self.block_size != 0 {
                return false;
            }
            let block = offset / self.block_size;
            if block >= page.initialized as usize || !page.allocated.contains(block) {
                return false;
            }

            page.region.write_u32(offset, page.free_head);
            page.free_head = block as u32;
            page.filled -= 1;
            page.allocated.set(block, false);
            return true;
        }
        false
    }

    /// Free/filled counts over all pages. Blocks the bump cursor has not
    /// reached yet count as free.
    #[must_use]
    pub fn stats(&self) -> TierStats {
        let mut free = 0;
        let mut filled = 0;
        let mut pages = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            filled += page.filled as usize;
            free += self.blocks_per_page - page.filled as usize;
            pages.push(PageSpan {
                base: page.region.base(),
                len: page.region.len(),
            });
        }
        TierStats {
            tier: crate::allocator::TierKind::Pool(self.block_size),
            free_blocks: free,
            filled_blocks: filled,
            pages,
        }
    }

    /// Appends every currently allocated block to `out`.
    pub fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        for page in &self.pages {
            for block in 0..page.initialized as usize {
                if page.allocated.contains(block) {
                    out.push(BlockInfo {
                        addr: page.region.base() + block * self.block_size,
                        size: self.block_size,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> FixedSizePool {
        FixedSizePool::new(16, 8).expect("pool mapping failed")
    }

    #[test]
    fn new_pool_maps_one_page() {
        let pool = pool();
        assert_eq!(pool.page_count(), 1);
        assert_eq!(pool.stats().filled_blocks, 0);
        assert_eq!(pool.stats().free_blocks, 8);
    }

    #[test]
    fn bump_allocation_hands_out_distinct_aligned_blocks() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_ne!(a, b);
        assert_eq!(a % ALIGN, 0);
        assert_eq!(b, a + 16);
    }

    #[test]
    fn freed_block_is_reused_before_bump_cursor_advances() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        assert!(pool.free(a));
        // The free-list head must be served before untouched block 2.
        assert_eq!(pool.alloc().unwrap(), a);
    }

    #[test]
    fn free_list_reuse_is_lifo_across_several_blocks() {
        let mut pool = pool();
        let blocks: Vec<usize> = (0..8).map(|_| pool.alloc().unwrap()).collect();
        // Free every other block, then reallocate: the freed slots must be
        // reused before any page growth.
        for &addr in blocks.iter().step_by(2) {
            assert!(pool.free(addr));
        }
        for _ in 0..4 {
            let addr = pool.alloc().unwrap();
            assert!(blocks.contains(&addr), "expected a recycled slot");
        }
        assert_eq!(pool.page_count(), 1);
    }

    #[test]
    fn exhausting_a_page_grows_a_second_one() {
        let mut pool = pool();
        let first_page: Vec<usize> = (0..8).map(|_| pool.alloc().unwrap()).collect();
        let overflow = pool.alloc().unwrap();
        assert_eq!(pool.page_count(), 2);
        // The overflow block must come from a disjoint address range.
        let first_base = pool.stats().pages[0].base;
        assert!(first_page.iter().all(|&a| a >= first_base && a < first_base + 8 * 16));
        assert!(!(overflow >= first_base && overflow < first_base + 8 * 16));
    }

    #[test]
    fn foreign_pointer_is_rejected() {
        let mut pool = pool();
        let local = 0u64;
        assert!(!pool.free(std::ptr::addr_of!(local) as usize));
    }

    #[test]
    fn misaligned_and_off_stride_pointers_are_rejected() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        assert!(!pool.free(a + 1));
        assert!(!pool.free(a + ALIGN)); // aligned but not on a block boundary
        assert!(pool.free(a));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        assert!(pool.free(a));
        assert!(!pool.free(a));
        // The rejected second free must not have corrupted the list: the
        // block comes back exactly once.
        assert_eq!(pool.alloc().unwrap(), a);
        assert!(pool.free(a));
    }

    #[test]
    fn never_initialized_block_is_rejected() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        // Block index 3 exists in the page but was never handed out.
        assert!(!pool.free(a + 3 * 16));
    }

    #[test]
    fn stats_track_fill_level() {
        let mut pool = pool();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_eq!(pool.stats().filled_blocks, 2);
        assert_eq!(pool.stats().free_blocks, 6);
        pool.free(a);
        assert_eq!(pool.stats().filled_blocks, 1);

        let mut live = Vec::new();
        pool.live_blocks(&mut live);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0], BlockInfo { addr: b, size: 16 });
    }
}
