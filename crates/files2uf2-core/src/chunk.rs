use std::slice::Chunks;

/// Splits `data` into pieces of `size` bytes, the last piece holding the remainder.
///
/// Empty input yields no chunks.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn chunks(data: &[u8], size: usize) -> Chunks<'_, u8> {
    data.chunks(size)
}
