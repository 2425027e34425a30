//! Errors surfaced by the virtual memory layer.

use thiserror::Error;

/// Failure of an OS mapping call.
///
/// A failed mapping propagates to callers as an allocation failure; it is
/// never retried by this layer.
#[derive(Debug, Error)]
pub enum VmError {
    /// The kernel refused to supply a new mapping of `len` bytes.
    #[error("mapping of {len} bytes failed: {source}")]
    MapFailed {
        len: usize,
        #[source]
        source: std::io::Error,
    },

    /// A zero-length mapping was requested.
    #[error("zero-length mapping requested")]
    ZeroLength,
}
