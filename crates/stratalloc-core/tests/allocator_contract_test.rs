//! End-to-end contract tests for the tiered allocator: every returned
//! region is writable over its full requested size, live allocations
//! never overlap, and release works in any order through the probing
//! front end.

use stratalloc_core::{AllocatorConfig, EventLevel, TierKind, TieredAllocator};

/// Writes a fill pattern across the whole region, then reads it back.
/// Catches both short mappings and aliasing between live allocations.
fn fill_and_verify(ptr: std::ptr::NonNull<u8>, size: usize, seed: u8) {
    let base = ptr.as_ptr();
    for i in 0..size {
        // SAFETY: the allocator contract grants exclusive read/write
        // access to `size` bytes starting at the returned pointer.
        unsafe { base.add(i).write(seed.wrapping_add(i as u8)) };
    }
    for i in 0..size {
        // SAFETY: same region, written just above.
        let got = unsafe { base.add(i).read() };
        assert_eq!(got, seed.wrapping_add(i as u8), "byte {i} of {size}");
    }
}

#[test]
fn every_size_class_boundary_round_trips() {
    let mut allocator = TieredAllocator::new().expect("allocator construction failed");
    let sizes = [
        1usize, 15, 16, 17, 31, 32, 33, 64, 128, 256, 511, 512, 513, 4096, 51_199, 60_000,
        10_485_759, 10_485_760,
    ];
    for &size in &sizes {
        let ptr = allocator.alloc(size).expect("alloc failed");
        fill_and_verify(ptr, size, size as u8);
        assert!(allocator.free(ptr), "free failed for size {size}");
    }
}

#[test]
fn concurrent_live_allocations_do_not_interfere() {
    let mut allocator = TieredAllocator::new().expect("allocator construction failed");
    let sizes = [8usize, 16, 24, 100, 512, 600, 4096, 50_000];
    let ptrs: Vec<_> = sizes
        .iter()
        .map(|&s| allocator.alloc(s).expect("alloc failed"))
        .collect();

    // Fill every region with a distinct pattern first, then verify all of
    // them; an overlap would corrupt an earlier pattern.
    for (i, (&ptr, &size)) in ptrs.iter().zip(&sizes).enumerate() {
        let base = ptr.as_ptr();
        for j in 0..size {
            // SAFETY: exclusive access to `size` bytes per allocation.
            unsafe { base.add(j).write((i as u8).wrapping_mul(31).wrapping_add(j as u8)) };
        }
    }
    for (i, (&ptr, &size)) in ptrs.iter().zip(&sizes).enumerate() {
        let base = ptr.as_ptr();
        for j in 0..size {
            // SAFETY: same regions as above.
            let got = unsafe { base.add(j).read() };
            assert_eq!(got, (i as u8).wrapping_mul(31).wrapping_add(j as u8));
        }
    }

    // Release in an order that interleaves the tiers.
    for &ptr in ptrs.iter().rev() {
        assert!(allocator.free(ptr));
    }
    assert_eq!(allocator.stats().filled_blocks(), 0);
}

#[test]
fn pool_churn_recycles_addresses_without_growth() {
    let mut allocator = TieredAllocator::with_config(AllocatorConfig {
        blocks_per_page: 4,
        arena_page_payload: 4096,
        large_threshold: 1 << 20,
    })
    .expect("allocator construction failed");

    // Repeatedly fill and drain one pool class; the page set must not
    // grow once the working set fits.
    let mut seen = std::collections::HashSet::new();
    for round in 0..10 {
        let ptrs: Vec<_> = (0..4)
            .map(|_| allocator.alloc(32).expect("alloc failed"))
            .collect();
        for &ptr in &ptrs {
            seen.insert(ptr.as_ptr() as usize);
        }
        for ptr in ptrs {
            assert!(allocator.free(ptr), "round {round}");
        }
    }
    assert_eq!(seen.len(), 4, "churn must recycle the same four blocks");
}

#[test]
fn freeing_in_any_order_restores_empty_stats() {
    let mut allocator = TieredAllocator::new().expect("allocator construction failed");
    let mut ptrs: Vec<_> = [40usize, 1000, 40, 2000, 300, 11_000_000]
        .iter()
        .map(|&s| allocator.alloc(s).expect("alloc failed"))
        .collect();
    // Middle-out release order.
    ptrs.swap(0, 3);
    ptrs.swap(1, 4);
    for ptr in ptrs {
        assert!(allocator.free(ptr));
    }
    let stats = allocator.stats();
    assert_eq!(stats.filled_blocks(), 0);
    assert!(allocator.blocks().is_empty());
}

#[test]
fn event_log_tells_the_whole_story() {
    let mut allocator = TieredAllocator::new().expect("allocator construction failed");
    let small = allocator.alloc(4).expect("alloc failed");
    let mid = allocator.alloc(1024).expect("alloc failed");
    allocator.free(small);
    allocator.free(mid);

    let events = allocator.drain_events();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.level == EventLevel::Trace));
    assert_eq!(events[0].tier, Some(TierKind::Pool(16)));
    assert_eq!(events[0].size, Some(4));
    assert_eq!(events[1].tier, Some(TierKind::Arena));
    assert_eq!(events[2].op, "free");
    assert_eq!(events[2].addr, Some(small.as_ptr() as usize));
    assert_eq!(events[3].tier, Some(TierKind::Arena));
}

#[test]
fn drop_releases_everything_without_explicit_frees() {
    let mut allocator = TieredAllocator::new().expect("allocator construction failed");
    let _a = allocator.alloc(64).expect("alloc failed");
    let _b = allocator.alloc(4096).expect("alloc failed");
    let _c = allocator.alloc(10_485_760).expect("alloc failed");
    // Dropping with live allocations must simply unmap the regions.
    drop(allocator);
}
