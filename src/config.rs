use crate::size::{DEFAULT_CHUNK_COUNT, DEFAULT_POOL_SIZE, kibi, mebi};

/// Sizing shared by every allocator constructor.
///
/// The linear, stack and free-list allocators read `pool_size`, the bitmap
/// allocator reads `chunk_count`. `backing_alignment` is what the pool asks
/// of its backing allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
  pub pool_size: usize,
  pub chunk_count: usize,
  pub backing_alignment: usize,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      pool_size: DEFAULT_POOL_SIZE,
      chunk_count: DEFAULT_CHUNK_COUNT,
      backing_alignment: 16,
    }
  }
}

impl PoolConfig {
  /// A pool that fits comfortably in L2 cache.
  pub fn small() -> Self {
    Self {
      pool_size: kibi(256),
      chunk_count: 64,
      ..Self::default()
    }
  }

  /// A large, cache-line aligned pool.
  pub fn large() -> Self {
    Self {
      pool_size: mebi(512),
      chunk_count: 8192,
      backing_alignment: 64,
    }
  }

  pub fn with_pool_size(
    mut self,
    pool_size: usize,
  ) -> Self {
    self.pool_size = pool_size;
    self
  }

  pub fn with_chunk_count(
    mut self,
    chunk_count: usize,
  ) -> Self {
    self.chunk_count = chunk_count;
    self
  }

  pub fn with_backing_alignment(
    mut self,
    backing_alignment: usize,
  ) -> Self {
    self.backing_alignment = backing_alignment;
    self
  }
}
