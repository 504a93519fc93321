use std::{cell::RefCell, ptr::NonNull};

use crate::error::{AllocError, InvalidOperation};

/// The capability shared by every allocator in this crate.
///
/// An alignment of `0` means "no alignment requirement". Any other alignment
/// must be a power of two.
///
/// Implementors are designed for exclusive, single-owner use: every method
/// takes `&mut self` and nothing is synchronized.
///
/// Because the trait is object safe, callers that need "any allocator" can
/// hold a `&mut dyn Allocator` or a `Box<dyn Allocator>`, while pool
/// allocators take their backing source as a generic parameter.
pub trait Allocator {
  /// Reserves `size` bytes aligned to `alignment` and returns their address.
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError>;

  /// Gives the block starting at `address` back to the allocator.
  ///
  /// # Safety
  ///
  /// `address` must have been returned by `allocate` on this same allocator
  /// and must not have been freed since. The memory must not be used after
  /// this call.
  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError>;
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
  #[inline]
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(size, alignment)
  }

  #[inline]
  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    unsafe { (**self).free(address) }
  }
}

impl<A: Allocator + ?Sized> Allocator for Box<A> {
  #[inline]
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(size, alignment)
  }

  #[inline]
  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    unsafe { (**self).free(address) }
  }
}

/// Lets several pools draw from one backing allocator.
///
/// The cell is borrowed only for the duration of each call, so a request made
/// while the backing allocator is already borrowed reports
/// [`InvalidOperation::BackingBusy`] instead of panicking.
impl<A: Allocator + ?Sized> Allocator for &RefCell<A> {
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self
      .try_borrow_mut()
      .map_err(|_| InvalidOperation::BackingBusy)?
      .allocate(size, alignment)
  }

  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let mut inner = self
      .try_borrow_mut()
      .map_err(|_| InvalidOperation::BackingBusy)?;

    unsafe { inner.free(address) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::SystemAllocator;

  fn round_trip(allocator: &mut dyn Allocator) {
    let address = allocator.allocate(64, 16).unwrap();
    assert_eq!(address.as_ptr() as usize % 16, 0);

    unsafe {
      address.as_ptr().write_bytes(0x5A, 64);
      assert_eq!(*address.as_ptr().add(63), 0x5A);
      allocator.free(address).unwrap();
    }
  }

  #[test]
  fn test_dyn_dispatch() {
    let mut system = SystemAllocator::new();
    round_trip(&mut system);

    let mut boxed: Box<dyn Allocator> = Box::new(SystemAllocator::new());
    round_trip(&mut boxed);
  }

  #[test]
  fn test_shared_backing() {
    let shared = RefCell::new(SystemAllocator::new());

    let mut first = &shared;
    let mut second = &shared;

    let a = first.allocate(32, 8).unwrap();
    let b = second.allocate(32, 8).unwrap();
    assert_ne!(a, b);

    unsafe {
      first.free(a).unwrap();
      second.free(b).unwrap();
    }
  }

  #[test]
  fn test_shared_backing_busy() {
    let shared = RefCell::new(SystemAllocator::new());
    let _guard = shared.borrow_mut();

    let mut handle = &shared;
    assert_eq!(
      handle.allocate(8, 8),
      Err(AllocError::InvalidOperation(InvalidOperation::BackingBusy))
    );
  }
}
