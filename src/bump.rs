use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::{
  align::{check_alignment, padding_for},
  allocator::Allocator,
  config::PoolConfig,
  error::{AllocError, InvalidOperation},
  pool::Pool,
  system::SystemAllocator,
};

/// Bump allocator over a fixed pool.
///
/// Every allocation moves a cursor forward. Individual blocks cannot be
/// freed; [`LinearAllocator::reset`] rewinds the cursor to the start of the
/// pool instead.
#[derive(Debug)]
pub struct LinearAllocator<B: Allocator = SystemAllocator> {
  pool: Pool<B>,
  current_offset: usize,
}

impl LinearAllocator {
  /// Creates an allocator over `size` bytes taken from the system heap.
  pub fn new(size: usize) -> Result<Self, AllocError> {
    Self::with_backing(size, SystemAllocator::new())
  }

  pub fn from_config(config: &PoolConfig) -> Result<Self, AllocError> {
    Self::from_config_with_backing(config, SystemAllocator::new())
  }
}

impl<B: Allocator> LinearAllocator<B> {
  /// Creates an allocator over `size` bytes taken from `backing`.
  pub fn with_backing(
    size: usize,
    backing: B,
  ) -> Result<Self, AllocError> {
    Self::from_config_with_backing(&PoolConfig::default().with_pool_size(size), backing)
  }

  pub fn from_config_with_backing(
    config: &PoolConfig,
    backing: B,
  ) -> Result<Self, AllocError> {
    let pool = Pool::acquire(config.pool_size, config.backing_alignment, backing)?;

    Ok(Self {
      pool,
      current_offset: 0,
    })
  }

  /// Rewinds the cursor to the start of the pool.
  ///
  /// Addresses handed out before the reset still point into the pool and
  /// will be handed out again. Nothing is scrubbed.
  pub fn reset(&mut self) {
    debug!(released = self.current_offset, "linear allocator reset");
    self.current_offset = 0;
  }

  pub fn current_offset(&self) -> usize {
    self.current_offset
  }

  pub fn remaining(&self) -> usize {
    self.pool.size() - self.current_offset
  }

  pub fn pool_size(&self) -> usize {
    self.pool.size()
  }

  pub fn base(&self) -> NonNull<u8> {
    self.pool.base()
  }
}

impl<B: Allocator> Allocator for LinearAllocator<B> {
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_alignment(alignment)?;

    let padding = padding_for(self.pool.address_of(self.current_offset), alignment);
    let start = self.current_offset + padding;

    match start.checked_add(size) {
      Some(end) if end <= self.pool.size() => {
        self.current_offset = end;

        let address = self.pool.ptr_at(start);
        trace!(?address, size, alignment, "linear allocate");
        Ok(address)
      }
      _ => {
        warn!(size, alignment, remaining = self.remaining(), "linear allocator exhausted");
        Err(AllocError::out_of_memory(size, alignment))
      }
    }
  }

  /// Always fails: a linear allocator can only be [`reset`](LinearAllocator::reset).
  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    warn!(?address, "free called on a linear allocator");
    Err(InvalidOperation::FreeUnsupported.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_alloc() {
    let mut allocator = LinearAllocator::new(1024).unwrap();

    unsafe {
      let first_addr = allocator.allocate(8, 8).unwrap().cast::<u64>();
      first_addr.write(3);
      assert_eq!(first_addr.read(), 3);

      let size: usize = 6;
      let second_addr = allocator.allocate(size * 2, 2).unwrap().cast::<u16>();

      for i in 0..size {
        second_addr.add(i).write((i + 1) as u16);
      }

      assert_eq!(first_addr.read(), 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, second_addr.add(i).read());
      }

      assert_eq!(allocator.current_offset(), 8 + 12);
    }
  }

  #[test]
  fn test_alignment_padding() {
    let mut allocator = LinearAllocator::new(1024).unwrap();

    allocator.allocate(3, 0).unwrap();
    assert_eq!(allocator.current_offset(), 3);

    let address = allocator.allocate(8, 64).unwrap();
    assert_eq!(address.as_ptr() as usize % 64, 0);
    assert_eq!(allocator.current_offset() % 8, 0);
  }

  #[test]
  fn test_out_of_memory() {
    let mut allocator = LinearAllocator::new(64).unwrap();

    allocator.allocate(60, 0).unwrap();
    assert_eq!(
      allocator.allocate(8, 0),
      Err(AllocError::OutOfMemory { requested: 8, alignment: 0 })
    );

    // A failed request leaves the cursor untouched.
    assert_eq!(allocator.current_offset(), 60);
    allocator.allocate(4, 0).unwrap();
    assert_eq!(allocator.remaining(), 0);
  }

  #[test]
  fn test_free_unsupported() {
    let mut allocator = LinearAllocator::new(64).unwrap();
    let address = allocator.allocate(8, 8).unwrap();

    assert_eq!(
      unsafe { allocator.free(address) },
      Err(AllocError::InvalidOperation(InvalidOperation::FreeUnsupported))
    );
  }

  #[test]
  fn test_reset_replays_addresses() {
    let mut allocator = LinearAllocator::new(256).unwrap();

    let sizes = [24usize, 40, 8, 100];
    let first_run: Vec<_> = sizes
      .iter()
      .map(|&size| allocator.allocate(size, 16).unwrap())
      .collect();
    assert!(allocator.allocate(256, 0).is_err());

    allocator.reset();
    assert_eq!(allocator.current_offset(), 0);

    let second_run: Vec<_> = sizes
      .iter()
      .map(|&size| allocator.allocate(size, 16).unwrap())
      .collect();
    assert_eq!(first_run, second_run);
  }

  #[test]
  fn test_from_config() {
    let allocator = LinearAllocator::from_config(&PoolConfig::small()).unwrap();
    assert_eq!(allocator.pool_size(), PoolConfig::small().pool_size);
    assert_eq!(allocator.base().as_ptr() as usize % 16, 0);
  }
}
