//! The dispatching front end.
//!
//! Routes every `alloc` to exactly one tier by request size and every
//! `free` by probing the tiers in a fixed order (pools ascending, then
//! the arena, then the store) until one claims ownership. Records a
//! structured lifecycle event for every operation, including failures;
//! the event log is the allocator's observability surface and can be
//! inspected or drained by the caller.

use std::ptr::NonNull;

use stratalloc_vm::VmError;

use crate::coalesce::CoalescingArena;
use crate::large::LargeObjectStore;
use crate::pool::FixedSizePool;
use crate::size_class::{LARGE_THRESHOLD, POOL_CLASSES, Route, route};
use crate::stats::{AllocatorStats, BlockInfo, TierStats};

/// Retained event cap. When the log reaches this length the oldest half
/// is discarded, so long-running callers that never drain still see the
/// recent history.
const EVENT_LOG_CAP: usize = 4096;

/// Identifies one of the three strategies behind the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// Fixed-size pool, tagged with its block size.
    Pool(usize),
    Arena,
    Store,
}

/// Severity of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Trace,
    Warn,
}

/// Structured record of one allocator operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocEvent {
    /// Monotonic event id.
    pub seq: u64,
    pub level: EventLevel,
    /// Operation (`alloc` / `free`).
    pub op: &'static str,
    /// Tier that served or claimed the operation, if any.
    pub tier: Option<TierKind>,
    /// Address involved, if any.
    pub addr: Option<usize>,
    /// Request size, for allocations.
    pub size: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
}

/// Tunables for [`TieredAllocator`]. All fields have the defaults of the
/// reference geometry; override via [`TieredAllocator::with_config`].
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Blocks per fixed-size pool page. Default: 100.
    pub blocks_per_page: usize,
    /// Arena page span in bytes, metadata included. Default: 51,200.
    pub arena_page_payload: usize,
    /// Request size at which allocations bypass the arena and map
    /// directly from the OS. Default: 10 MiB.
    pub large_threshold: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            blocks_per_page: 100,
            arena_page_payload: 512 * 100,
            large_threshold: LARGE_THRESHOLD,
        }
    }
}

/// Capability seam between the dispatcher and its strategies. The
/// strategies themselves are concrete; only the probe and diagnostic
/// loops need to treat them uniformly.
trait Tier {
    fn kind(&self) -> TierKind;
    /// Claims and releases `addr` if this tier owns it.
    fn release(&mut self, addr: usize) -> bool;
    fn stats(&self) -> TierStats;
    fn live_blocks(&self, out: &mut Vec<BlockInfo>);
}

impl Tier for FixedSizePool {
    fn kind(&self) -> TierKind {
        TierKind::Pool(self.block_size())
    }
    fn release(&mut self, addr: usize) -> bool {
        self.free(addr)
    }
    fn stats(&self) -> TierStats {
        FixedSizePool::stats(self)
    }
    fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        FixedSizePool::live_blocks(self, out);
    }
}

impl Tier for CoalescingArena {
    fn kind(&self) -> TierKind {
        TierKind::Arena
    }
    fn release(&mut self, addr: usize) -> bool {
        self.free(addr)
    }
    fn stats(&self) -> TierStats {
        CoalescingArena::stats(self)
    }
    fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        CoalescingArena::live_blocks(self, out);
    }
}

impl Tier for LargeObjectStore {
    fn kind(&self) -> TierKind {
        TierKind::Store
    }
    fn release(&mut self, addr: usize) -> bool {
        self.free(addr)
    }
    fn stats(&self) -> TierStats {
        LargeObjectStore::stats(self)
    }
    fn live_blocks(&self, out: &mut Vec<BlockInfo>) {
        LargeObjectStore::live_blocks(self, out);
    }
}

/// The allocator front end: six fixed-size pools, one coalescing arena,
/// one large-object store.
///
/// Single-threaded by construction; every operation takes `&mut self`
/// and runs to completion. Dropping the allocator releases every
/// OS-backed region it owns.
pub struct TieredAllocator {
    config: AllocatorConfig,
    pools: [FixedSizePool; 6],
    arena: CoalescingArena,
    store: LargeObjectStore,
    next_seq: u64,
    events: Vec<AllocEvent>,
}

impl TieredAllocator {
    /// Creates an allocator with the default geometry, mapping the first
    /// page of every pool and of the arena.
    pub fn new() -> Result<Self, VmError> {
        Self::with_config(AllocatorConfig::default())
    }

    /// Creates an allocator with explicit tunables.
    pub fn with_config(config: AllocatorConfig) -> Result<Self, VmError> {
        assert!(
            config.large_threshold > POOL_CLASSES[POOL_CLASSES.len() - 1],
            "large threshold must exceed the largest pool class"
        );
        let pool = |class: usize| FixedSizePool::new(class, config.blocks_per_page);
        let pools = [
            pool(POOL_CLASSES[0])?,
            pool(POOL_CLASSES[1])?,
            pool(POOL_CLASSES[2])?,
            pool(POOL_CLASSES[3])?,
            pool(POOL_CLASSES[4])?,
            pool(POOL_CLASSES[5])?,
        ];
        let arena = CoalescingArena::new(config.arena_page_payload)?;
        Ok(Self {
            config,
            pools,
            arena,
            store: LargeObjectStore::new(),
            next_seq: 1,
            events: Vec::new(),
        })
    }

    /// Returns a region of at least `size` usable bytes, or `None` when
    /// the OS cannot supply more memory.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let (kind, addr) = match route(size, self.config.large_threshold) {
            Route::Pool(index) => (
                TierKind::Pool(POOL_CLASSES[index]),
                self.pools[index].alloc(),
            ),
            Route::Arena => (TierKind::Arena, self.arena.alloc(size)),
            Route::Store => (TierKind::Store, self.store.alloc(size)),
        };
        match addr {
            Some(addr) => {
                self.record(
                    EventLevel::Trace,
                    "alloc",
                    Some(kind),
                    Some(addr),
                    Some(size),
                    "success",
                );
                NonNull::new(addr as *mut u8)
            }
            None => {
                self.record(EventLevel::Warn, "alloc", Some(kind), None, Some(size), "oom");
                None
            }
        }
    }

    /// Releases a previously returned, still-live pointer.
    ///
    /// Probes the tiers in fixed order and stops at the first that
    /// claims `ptr`. Returns `false` — and records a warning event —
    /// when no tier recognizes the pointer; nothing is mutated in that
    /// case.
    pub fn free(&mut self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let mut claimed = None;
        let [p16, p32, p64, p128, p256, p512] = &mut self.pools;
        let tiers: [&mut dyn Tier; 8] = [
            p16,
            p32,
            p64,
            p128,
            p256,
            p512,
            &mut self.arena,
            &mut self.store,
        ];
        for tier in tiers {
            if tier.release(addr) {
                claimed = Some(tier.kind());
                break;
            }
        }
        match claimed {
            Some(kind) => {
                self.record(
                    EventLevel::Trace,
                    "free",
                    Some(kind),
                    Some(addr),
                    None,
                    "success",
                );
                true
            }
            None => {
                self.record(
                    EventLevel::Warn,
                    "free",
                    None,
                    Some(addr),
                    None,
                    "foreign_pointer",
                );
                false
            }
        }
    }

    /// Read-only snapshot of free/filled block counts and page spans per
    /// tier. Never mutates allocator state.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let tiers: [&dyn Tier; 8] = [
            &self.pools[0],
            &self.pools[1],
            &self.pools[2],
            &self.pools[3],
            &self.pools[4],
            &self.pools[5],
            &self.arena,
            &self.store,
        ];
        AllocatorStats {
            tiers: tiers.iter().map(|t| t.stats()).collect(),
        }
    }

    /// Address and size of every currently allocated block, across all
    /// tiers. Never mutates allocator state.
    #[must_use]
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let tiers: [&dyn Tier; 8] = [
            &self.pools[0],
            &self.pools[1],
            &self.pools[2],
            &self.pools[3],
            &self.pools[4],
            &self.pools[5],
            &self.arena,
            &self.store,
        ];
        let mut out = Vec::new();
        for tier in tiers {
            tier.live_blocks(&mut out);
        }
        out
    }

    /// Lifecycle events recorded so far. The log is bounded; once full,
    /// the oldest entries are discarded.
    #[must_use]
    pub fn events(&self) -> &[AllocEvent] {
        &self.events
    }

    /// Drains the lifecycle event log.
    pub fn drain_events(&mut self) -> Vec<AllocEvent> {
        std::mem::take(&mut self.events)
    }

    fn record(
        &mut self,
        level: EventLevel,
        op: &'static str,
        tier: Option<TierKind>,
        addr: Option<usize>,
        size: Option<usize>,
        outcome: &'static str,
    ) {
        if self.events.len() >= EVENT_LOG_CAP {
            self.events.drain(..EVENT_LOG_CAP / 2);
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.events.push(AllocEvent {
            seq,
            level,
            op,
            tier,
            addr,
            size,
            outcome,
        });
    }
}
