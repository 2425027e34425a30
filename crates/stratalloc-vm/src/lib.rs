//! # stratalloc-vm
//!
//! The OS-facing layer of the stratalloc allocator: anonymous virtual
//! memory mappings behind an owned [`Region`] type.
//!
//! This is the only crate in the workspace that contains `unsafe` code.
//! Everything above it (pools, coalescing arena, large-object store,
//! dispatcher) manipulates memory exclusively through `Region`'s
//! bounds-checked offset accessors, which keeps the allocator core free
//! of raw pointer dereferences.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("stratalloc supports only 64-bit targets.");

pub mod error;
pub mod region;

pub use error::VmError;
pub use region::{ALIGN, Region};
