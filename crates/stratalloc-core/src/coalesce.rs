//! Boundary-tag coalescing allocator for mid-size requests.
//!
//! Every block is a 32-byte header, the payload, then an 8-byte footer
//! holding the header's offset. The footer is the boundary tag: the block
//! to the left of any header is found through the footer just before it,
//! and the block to the right by address arithmetic over the recorded
//! size. Free blocks are threaded onto a per-page doubly-linked list whose
//! links are offsets stored in the headers themselves.
//!
//! Allocation is first-fit over each page's free list in insertion order
//! (most-recently-freed first), splitting off a right-hand remainder when
//! one fits. Coalescing is eager: every release merges the freed block
//! with whichever neighbors are free, so fragmentation is bounded to one
//! free gap per boundary.

use stratalloc_vm::{ALIGN, Region, VmError};

use crate::stats::{BlockInfo, PageSpan, TierStats};

/// Header layout, in words at the header offset:
/// tag, payload size, next free offset, prev free offset.
const HEADER_SIZE: usize = 32;
const TAG_WORD: usize = 0;
const SIZE_WORD: usize = 8;
const NEXT_WORD: usize = 16;
const PREV_WORD: usize = 24;

/// Footer: one word holding the owning header's offset.
const FOOTER_SIZE: usize = 8;

/// Offset sentinel for "no block".
const NONE: usize = usize::MAX;

/// Header tag magics. A release is only honored when the tag reads
/// exactly [`TAG_ALLOCATED`], which rejects double frees and stray
/// in-page pointers instead of corrupting the free list.
const TAG_ALLOCATED: usize = 0xA110_CA7E;
const TAG_FREE: usize = 0xF4EE_B10C;

fn align_up(value: usize) -> usize {
    (value + ALIGN - 1) & !(ALIGN - 1)
}

struct ArenaPage {
    region: Region,
    /// Offset of the free-list head, [`NONE`] when empty.
    free_head: usize,
}

impl ArenaPage {
    /// Maps a page and carves its whole span into a single free block.
    fn map(len: usize) -> Result<Self, VmError> {
        let region = Region::map(len)?;
        let mut page = Self {
            region,
            free_head: NONE,
        };
        // A fresh page always has room for one block.
        if let Some(block) = page.create_block(0, len - FOOTER_SIZE) {
            page.push_free(block);
        }
        Ok(page)
    }

    fn len(&self) -> usize {
        self.region.len()
    }

    fn tag(&self, header: usize) -> usize {
        self.region.read_word(header + TAG_WORD)
    }

    fn block_size(&self, header: usize) -> usize {
        self.region.read_word(header + SIZE_WORD)
    }

    fn set_block_size(&mut self, header: usize, size: usize) {
        self.region.write_word(header + SIZE_WORD, size);
    }

    fn next_free(&self, header: usize) -> usize {
        self.region.read_word(header + NEXT_WORD)
    }

    fn prev_free(&self, header: usize) -> usize {
        self.region.read_word(header + PREV_WORD)
    }

    /// Builds a free block between a prospective header position and a
    /// fixed footer position. The payload start is aligned upward; when
    /// alignment pushes it to or past the footer there is no usable space
    /// and construction fails.
    fn create_block(&mut self, header_from: usize, footer: usize) -> Option<usize> {
        let payload = align_up(header_from + HEADER_SIZE);
        if payload >= footer {
            return None;
        }
        let header = payload - HEADER_SIZE;
        self.region.write_word(header + TAG_WORD, TAG_FREE);
        self.region.write_word(header + SIZE_WORD, footer - payload);
        self.region.write_word(header + NEXT_WORD, NONE);
        self.region.write_word(header + PREV_WORD, NONE);
        self.region.write_word(footer, header);
        Some(header)
    }

    fn push_free(&mut self, header: usize) {
        let head = self.free_head;
        self.region.write_word(header + NEXT_WORD, head);
        self.region.write_word(header + PREV_WORD, NONE);
        if head != NONE {
            self.region.write_word(head + PREV_WORD, header);
        }
        self.free_head = header;
    }

    fn unlink_free(&mut self, header: usize) {
        let next = self.next_free(header);
        let prev = self.prev_free(header);
        if prev != NONE {
            self.region.write_word(prev + NEXT_WORD, next);
        } else {
            self.free_head = next;
        }
        if next != NONE {
            self.region.write_word(next + PREV_WORD, prev);
        }
        self.region.write_word(header + NEXT_WORD, NONE);
        self.region.write_word(header + PREV_WORD, NONE);
    }

    /// First-fit over this page's free list. Returns the payload offset.
    fn alloc(&mut self, size: usize) -> Option<usize> {
        let mut header = self.free_head;
        while header != NONE {
            if self.block_size(header) >= size {
                return Some(self.take_block(header, size));
            }
            header = self.next_free(header);
        }
        None
    }

    /// Claims `header`, splitting off the leftover space as a new free
    /// block when another header+footer pair fits; otherwise the whole
    /// block is taken as-is.
    fn take_block(&mut self, header: usize, size: usize) -> usize {
        let footer = header + HEADER_SIZE + self.block_size(header);
        self.unlink_free(header);

        let right_from = header + HEADER_SIZE + size + FOOTER_SIZE;
        if let Some(right) = self.create_block(right_from, footer) {
            self.push_free(right);
            // Shrink the left portion onto a fresh footer just before the
            // remainder's header.
            let left_footer = right - FOOTER_SIZE;
            self.set_block_size(header, left_footer - (header + HEADER_SIZE));
            self.region.write_word(left_footer, header);
        }

        self.region.write_word(header + TAG_WORD, TAG_ALLOCATED);
        header + HEADER_SIZE
    }

    /// Releases the block whose payload starts at `offset`, coalescing
    /// with free neighbors. Returns `false` for anything that is not the
    /// payload offset of a live block.
    fn free_at(&mut self, offset: usize) -> bool {
        if offset % ALIGN != 0 || offset < HEADER_SIZE {
            return false;
        }
        let mut header = offset - HEADER_SIZE;
        if self.tag(header) != TAG_ALLOCATED {
            return false;
        }
        let mut size = self.block_size(header);
        // The size word is untrusted until the footer back-pointer agrees.
        let Some(footer) = (header + HEADER_SIZE).checked_add(size) else {
            return false;
        };
        if footer + FOOTER_SIZE > self.len() || self.region.read_word(footer) != header {
            return false;
        }

        // Left neighbor via the footer just before this header.
        if header > 0 {
            let left_footer = header - FOOTER_SIZE;
            let left = self.region.read_word(left_footer);
            if left % ALIGN == 0
                && left + HEADER_SIZE <= left_footer
                && self.tag(left) == TAG_FREE
                && left + HEADER_SIZE + self.block_size(left) == left_footer
            {
                self.unlink_free(left);
                // The absorbed header and footer become payload.
                self.region.write_word(footer, left);
                size += self.block_size(left) + HEADER_SIZE + FOOTER_SIZE;
                self.set_block_size(left, size);
                header = left;
            }
        }

        // Right neighbor via address arithmetic over the recorded size.
        let right = header + HEADER_SIZE + size + FOOTER_SIZE;
        if right + HEADER_SIZE <= self.len() && self.tag(right) == TAG_FREE {
            let right_size = self.block_size(right);
            let right_footer = right + HEADER_SIZE + right_size;
            if right_footer + FOOTER_SIZE <= self.len()
                && self.region.read_word(right_footer) == right
            {
                self.unlink_free(right);
                self.region.write_word(right_footer, header);
                size += right_size + HEADER_SIZE + FOOTER_SIZE;
                self.set_block_size(header, size);
            }
        }

        self.region.write_word(header + TAG_WORD, TAG_FREE);
        self.push_free(header);
        true
    }

    /// Walks every block on the page front to back.
    fn walk_blocks(&self, mut visit: impl FnMut(usize, usize, bool)) {
        let mut header = 0;
        while header + HEADER_SIZE + FOOTER_SIZE <= self.len() {
            let size = self.block_size(header);
            visit(header, size, self.tag(header) == TAG_FREE);
            header += HEADER_SIZE + size + FOOTER_SIZE;
        }
    }
}

/// Boundary-tagged, page-based allocator for variable-size requests
/// below the large-object threshold.
pub struct CoalescingArena {
    default_payload: usize,
    pages: Vec<ArenaPage>,
}

impl CoalescingArena {
    /// Creates the arena and maps its first page of `default_payload`
    /// bytes (header/footer overhead comes out of that span).
    pub fn new(default_payload: usize) -> Result<Self, VmError> {
        assert!(
            default_payload > HEADER_SIZE + FOOTER_SIZE && default_payload % ALIGN == 0,
            "unusable arena page payload: {default_payload}"
        );
        let first = ArenaPage::map(default_payload)?;
        Ok(Self {
            default_payload,
            pages: vec![first],
        })
    }

    /// Number of pages currently mapped.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns the payload address of a block of at least `size` bytes,
    /// or `None` if the OS cannot supply a new page.
    ///
    /// Pages are scanned in creation order; when no page has a fitting
    /// free block a new page is appended and the search continues into
    /// it. A request larger than the default payload gets a page sized to
    /// fit, so growth always terminates.
    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        let mut index = 0;
        loop {
            if index == self.pages.len() {
                let len = self
                    .default_payload
                    .max(align_up(size) + HEADER_SIZE + FOOTER_SIZE + ALIGN);
                let page = ArenaPage::map(len).ok()?;
                self.pages.push(page);
            }
            let page = &mut self.pages[index];
            if let Some(offset) = page.alloc(size) {
                return Some(page.region.base() + offset);
            }
            index += 1;
        }
    }

    /// Releases a block previously returned by [`alloc`](Self::alloc),
    /// eagerly merging it with free neighbors.
    ///
    /// Returns `false` without mutating any state when `addr` is not the
    /// live payload address of a block owned by this arena (foreign,
    /// misaligned, or already free).
    pub fn free(&mut self, addr: usize) -> bool {
        for page in &mut self.pages {
            if page.region.contains(addr) {
                return page.free_at(addr - page.region.base());
            }
        }
        false
    }

    /// Free/filled block counts over all pages.
    #[must_use]
    pub fn stats(&self) -> TierStats {
        let mut free = 0;
        let mut filled = 0;
        let mut pages = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            page.walk_blocks(|_, _, is_free| {
                if is_free {
                    free += 1;
                } else {
                    filled += 1;
                }
            });
            pages.push(PageSpan {
                base: page.region.base(),
                len: page.len(),
            });
        }
        TierStats {
            tier: crate::allocator::TierKind::Arena,
            free_blocks: free,
            filled_blocks: filled,
            pages,
        }
    }

    /// Appends every currently allocated block to `out`.
    pub fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        for page in &self.pages {
            let base = page.region.base();
            page.walk_blocks(|header, size, is_free| {
                if !is_free {
                    out.push(BlockInfo {
                        addr: base + header + HEADER_SIZE,
                        size,
                    });
                }
            });
        }
    }
}
