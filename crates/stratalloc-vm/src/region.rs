//! Owned anonymous mappings with offset-based accessors.

use std::ptr::NonNull;

use crate::error::VmError;

/// Alignment boundary (bytes) guaranteed for every address handed out by
/// the allocator tiers. Mappings start page-aligned, so any 8-aligned
/// offset into a [`Region`] yields an 8-aligned address.
pub const ALIGN: usize = 8;

/// One contiguous OS-backed memory region, obtained in a single mapping
/// call and released when the value is dropped.
///
/// A `Region` is the unit of page growth for the pools and the coalescing
/// arena, and the unit of allocation for the large-object store. All
/// metadata reads and writes go through the offset accessors below, which
/// bounds-check against the mapped length; an out-of-range offset is a
/// programmer error and panics.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Maps `len` bytes of zero-initialized anonymous memory, reserved
    /// and committed in one call.
    pub fn map(len: usize) -> Result<Self, VmError> {
        if len == 0 {
            return Err(VmError::ZeroLength);
        }

        // Safety: FFI call to mmap; a private anonymous mapping with no
        // backing fd has no further preconditions.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(VmError::MapFailed {
                len,
                source: std::io::Error::last_os_error(),
            });
        }

        match NonNull::new(ptr.cast::<u8>()) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(VmError::MapFailed {
                len,
                source: std::io::Error::other("mmap returned null"),
            }),
        }
    }

    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the mapping.
    #[must_use]
    pub fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Whether `addr` falls inside the mapped range.
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base() && addr < self.base() + self.len
    }

    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset % width == 0 && offset.checked_add(width).is_some_and(|end| end <= self.len),
            "region access out of bounds: offset {offset} width {width} len {}",
            self.len
        );
    }

    /// Reads a native-width word at `offset` (must be 8-aligned).
    #[must_use]
    pub fn read_word(&self, offset: usize) -> usize {
        self.check(offset, size_of::<usize>());
        // Safety: the offset is in bounds and aligned (checked above), and
        // the mapping is readable for its whole length.
        unsafe { self.ptr.as_ptr().add(offset).cast::<usize>().read() }
    }

    /// Writes a native-width word at `offset` (must be 8-aligned).
    pub fn write_word(&mut self, offset: usize, value: usize) {
        self.check(offset, size_of::<usize>());
        // Safety: in bounds and aligned (checked above); `&mut self` gives
        // exclusive access to the mapping.
        unsafe { self.ptr.as_ptr().add(offset).cast::<usize>().write(value) }
    }

    /// Reads a `u32` at `offset` (must be 4-aligned).
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check(offset, size_of::<u32>());
        // Safety: in bounds and aligned (checked above).
        unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read() }
    }

    /// Writes a `u32` at `offset` (must be 4-aligned).
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.check(offset, size_of::<u32>());
        // Safety: in bounds and aligned (checked above); exclusive access
        // via `&mut self`.
        unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().write(value) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // Safety: FFI call to munmap with the exact base and length the
        // mapping was created with. Failure cannot be propagated from
        // Drop; the range stays mapped until process exit in that case.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast::<libc::c_void>(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_write_read_release() {
        let mut region = Region::map(4096).expect("map failed");
        assert_eq!(region.len(), 4096);
        assert_eq!(region.base() % ALIGN, 0);

        region.write_word(0, 0xDEAD_BEEF);
        region.write_word(4088, 42);
        assert_eq!(region.read_word(0), 0xDEAD_BEEF);
        assert_eq!(region.read_word(4088), 42);
    }

    #[test]
    fn fresh_mapping_is_zeroed() {
        let region = Region::map(4096).expect("map failed");
        for offset in (0..4096).step_by(8) {
            assert_eq!(region.read_word(offset), 0);
        }
    }

    #[test]
    fn zero_length_mapping_rejected() {
        assert!(matches!(Region::map(0), Err(VmError::ZeroLength)));
    }

    #[test]
    fn contains_covers_exactly_the_mapped_range() {
        let region = Region::map(4096).expect("map failed");
        let base = region.base();
        assert!(region.contains(base));
        assert!(region.contains(base + 4095));
        assert!(!region.contains(base + 4096));
        assert!(!region.contains(base.wrapping_sub(1)));
    }

    #[test]
    fn u32_accessors_round_trip() {
        let mut region = Region::map(64).expect("map failed");
        region.write_u32(4, u32::MAX);
        assert_eq!(region.read_u32(4), u32::MAX);
        assert_eq!(region.read_u32(0), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_read_panics() {
        let region = Region::map(64).expect("map failed");
        let _ = region.read_word(64);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn misaligned_word_access_panics() {
        let region = Region::map(64).expect("map failed");
        let _ = region.read_word(4);
    }

    #[test]
    fn distinct_mappings_do_not_overlap() {
        let a = Region::map(4096).expect("map a failed");
        let b = Region::map(4096).expect("map b failed");
        assert!(!a.contains(b.base()));
        assert!(!b.contains(a.base()));
    }
}
