//! The single contiguous region every allocator serves from.
//!
//! Allocators never hold pointers into their pool. They keep byte offsets
//! and go through [`Pool::read`] and [`Pool::write`] whenever they need to
//! look at bookkeeping stored in place, which keeps every typed view of the
//! raw bytes behind one audited boundary.

use std::{fmt, mem, ptr::NonNull};

use tracing::{debug, error};

use crate::{allocator::Allocator, error::AllocError, system::SystemAllocator};

pub(crate) struct Pool<B: Allocator = SystemAllocator> {
  base: NonNull<u8>,
  size: usize,
  backing: B,
}

impl<B: Allocator> Pool<B> {
  /// Obtains `size` bytes aligned to `alignment` from `backing`.
  pub(crate) fn acquire(
    size: usize,
    alignment: usize,
    mut backing: B,
  ) -> Result<Self, AllocError> {
    if size == 0 {
      return Err(AllocError::PoolAcquisition { size });
    }

    let base = backing
      .allocate(size, alignment)
      .map_err(|_| AllocError::PoolAcquisition { size })?;

    debug!(base = ?base, size, alignment, "acquired pool");

    Ok(Self { base, size, backing })
  }

  #[inline]
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }

  /// Absolute address of the byte at `offset`.
  #[inline]
  pub(crate) fn address_of(
    &self,
    offset: usize,
  ) -> usize {
    self.base.as_ptr() as usize + offset
  }

  #[inline]
  pub(crate) fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset <= self.size, "offset {offset} past pool end {}", self.size);
    unsafe { self.base.add(offset) }
  }

  /// Offset of `address` inside the pool, if it lies inside it.
  #[inline]
  pub(crate) fn offset_of(
    &self,
    address: NonNull<u8>,
  ) -> Option<usize> {
    let offset = (address.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
    (offset < self.size).then_some(offset)
  }

  /// Reads a `T` stored in place at `offset`.
  ///
  /// # Safety
  ///
  /// A valid `T` must have been written at `offset` with [`Pool::write`].
  #[inline]
  pub(crate) unsafe fn read<T: Copy>(
    &self,
    offset: usize,
  ) -> T {
    debug_assert!(
      offset + mem::size_of::<T>() <= self.size,
      "read of {} bytes at {offset} overruns pool of {} bytes",
      mem::size_of::<T>(),
      self.size
    );
    unsafe { self.base.add(offset).cast::<T>().read_unaligned() }
  }

  /// Stores `value` in place at `offset`.
  ///
  /// # Safety
  ///
  /// `offset..offset + size_of::<T>()` must be inside the pool and must not
  /// overlap memory a caller of the allocator still uses.
  #[inline]
  pub(crate) unsafe fn write<T>(
    &mut self,
    offset: usize,
    value: T,
  ) {
    debug_assert!(
      offset + mem::size_of::<T>() <= self.size,
      "write of {} bytes at {offset} overruns pool of {} bytes",
      mem::size_of::<T>(),
      self.size
    );
    unsafe { self.base.add(offset).cast::<T>().write_unaligned(value) }
  }

  /// Fills `len` bytes starting at `offset` with `byte`.
  ///
  /// # Safety
  ///
  /// Same as [`Pool::write`].
  #[inline]
  pub(crate) unsafe fn fill(
    &mut self,
    offset: usize,
    len: usize,
    byte: u8,
  ) {
    debug_assert!(offset + len <= self.size);
    unsafe { self.base.add(offset).write_bytes(byte, len) }
  }
}

impl<B: Allocator> Drop for Pool<B> {
  fn drop(&mut self) {
    debug!(base = ?self.base, size = self.size, "releasing pool");

    if let Err(err) = unsafe { self.backing.free(self.base) } {
      error!(base = ?self.base, %err, "backing allocator refused to release pool");
    }
  }
}

impl<B: Allocator> fmt::Debug for Pool<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("base", &self.base)
      .field("size", &self.size)
      .finish_non_exhaustive()
  }
}
