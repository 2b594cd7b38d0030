//! In-place element swap with range checking.

use crate::error::IndexOutOfRange;

/// Exchange `slice[i]` and `slice[j]`.
///
/// Returns an error instead of panicking when either index is out of range.
pub fn swap<T>(slice: &mut [T], i: usize, j: usize) -> Result<(), IndexOutOfRange> {
    let len = slice.len();
    if i >= len || j >= len {
        return Err(IndexOutOfRange { i, j, len });
    }
    slice.swap(i, j);
    Ok(())
}
