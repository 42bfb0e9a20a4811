//! Error types for the core operations.

use thiserror::Error;

/// Failures the core can report.
///
/// Invalid parameters (non-positive sizes, empty input) are not errors; they
/// produce empty or identity results instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The grid needed for a neighbor search has more cells than can be addressed.
    #[error("grid of {dims:?} cells is too large to index")]
    GridTooLarge {
        /// Cells per axis.
        dims: [usize; 3],
    },

    /// A working buffer could not be allocated.
    #[error("failed to allocate {elements} elements for {what}")]
    Allocation {
        /// Buffer that failed.
        what: &'static str,
        /// Requested element count.
        elements: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Allocate a vector of `len` copies of `value`, reporting failure instead of aborting.
pub(crate) fn try_filled<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| Error::Allocation { what, elements: len })?;
    v.resize(len, value);
    Ok(v)
}
