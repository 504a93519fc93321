//! Byte-count helpers used to size pools.

/// `n` kibibytes.
pub const fn kibi(n: usize) -> usize {
  n * 1024
}

/// `n` mebibytes.
pub const fn mebi(n: usize) -> usize {
  n * 1024 * 1024
}

/// `n` gibibytes.
pub const fn gibi(n: usize) -> usize {
  n * 1024 * 1024 * 1024
}

/// Pool size used by the linear, stack and free-list allocators when none is
/// given.
pub const DEFAULT_POOL_SIZE: usize = mebi(50);

/// Chunk count used by the bitmap allocator when none is given.
pub const DEFAULT_CHUNK_COUNT: usize = 512;
