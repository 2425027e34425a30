//! Size-class routing for the dispatcher.
//!
//! Six fixed pool classes serve small requests; anything above the largest
//! class but below the large-object threshold goes to the coalescing
//! arena; everything else maps straight from the OS.

/// Block sizes served by the fixed-size pools, ascending.
pub const POOL_CLASSES: [usize; 6] = [16, 32, 64, 128, 256, 512];

/// Default boundary (bytes) above which requests bypass the pooled and
/// coalescing tiers and map directly from the OS. 10 MiB.
pub const LARGE_THRESHOLD: usize = 10 * 1024 * 1024;

/// The tier a request of a given size is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Index into [`POOL_CLASSES`].
    Pool(usize),
    /// Coalescing arena.
    Arena,
    /// Large-object store.
    Store,
}

/// Routes a request size to a tier, ascending thresholds first.
///
/// `large_threshold` is configurable on the dispatcher; sizes strictly
/// below it (and above the largest pool class) go to the arena.
#[must_use]
pub fn route(size: usize, large_threshold: usize) -> Route {
    for (index, &class) in POOL_CLASSES.iter().enumerate() {
        if size <= class {
            return Route::Pool(index);
        }
    }
    if size < large_threshold {
        Route::Arena
    } else {
        Route::Store
    }
}
