//! Typed views over a shared allocator.
//!
//! [`TypedAllocator`] hands out storage for `count` values of `T` from any
//! [`Allocator`] kept in a [`RefCell`], so several containers can draw from
//! the same pool. [`PoolBox`] owns one value placed that way.

use std::{
  cell::RefCell,
  fmt,
  marker::PhantomData,
  mem,
  ops::{Deref, DerefMut},
  ptr::{self, NonNull},
};

use tracing::{error, trace};

use crate::{allocator::Allocator, error::AllocError};

/// Allocates arrays of `T` from a shared allocator.
///
/// Two adapters compare equal when they draw from the same allocator, whatever
/// their element types, so memory obtained through one may be given back
/// through the other.
pub struct TypedAllocator<'a, T, A: Allocator + ?Sized> {
  allocator: &'a RefCell<A>,
  _marker: PhantomData<fn() -> T>,
}

impl<'a, T, A: Allocator + ?Sized> TypedAllocator<'a, T, A> {
  pub fn new(allocator: &'a RefCell<A>) -> Self {
    Self {
      allocator,
      _marker: PhantomData,
    }
  }

  /// Storage for `count` values of `T`, aligned for `T`.
  ///
  /// Nothing is initialized.
  pub fn allocate(
    &self,
    count: usize,
  ) -> Result<NonNull<T>, AllocError> {
    let alignment = mem::align_of::<T>();
    let size = count
      .checked_mul(mem::size_of::<T>())
      .ok_or(AllocError::out_of_memory(usize::MAX, alignment))?;

    let mut allocator = self.allocator;
    let address = allocator.allocate(size, alignment)?;

    trace!(?address, count, element_size = mem::size_of::<T>(), "typed allocate");
    Ok(address.cast())
  }

  /// Gives back storage obtained from [`allocate`](Self::allocate).
  ///
  /// # Safety
  ///
  /// `address` must come from `allocate` on an adapter equal to this one and
  /// must not have been given back since. Values stored there are not
  /// dropped.
  pub unsafe fn deallocate(
    &self,
    address: NonNull<T>,
    count: usize,
  ) -> Result<(), AllocError> {
    trace!(?address, count, "typed deallocate");

    let mut allocator = self.allocator;
    unsafe { allocator.free(address.cast()) }
  }

  /// Same allocator, different element type.
  pub fn rebind<U>(&self) -> TypedAllocator<'a, U, A> {
    TypedAllocator::new(self.allocator)
  }

  pub fn inner(&self) -> &'a RefCell<A> {
    self.allocator
  }
}

impl<T, A: Allocator + ?Sized> Clone for TypedAllocator<'_, T, A> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T, A: Allocator + ?Sized> Copy for TypedAllocator<'_, T, A> {}

impl<T, U, A: Allocator + ?Sized> PartialEq<TypedAllocator<'_, U, A>> for TypedAllocator<'_, T, A> {
  fn eq(
    &self,
    other: &TypedAllocator<'_, U, A>,
  ) -> bool {
    ptr::eq(self.allocator, other.allocator)
  }
}

impl<T, A: Allocator + ?Sized> Eq for TypedAllocator<'_, T, A> {}

impl<T, A: Allocator + ?Sized> fmt::Debug for TypedAllocator<'_, T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("TypedAllocator")
      .field("element", &std::any::type_name::<T>())
      .field("allocator", &(self.allocator as *const RefCell<A>))
      .finish()
  }
}

/// A single `T` living in memory drawn through a [`TypedAllocator`].
///
/// Dropping the box drops the value, then hands its memory back.
pub struct PoolBox<'a, T, A: Allocator + ?Sized> {
  value: NonNull<T>,
  allocator: TypedAllocator<'a, T, A>,
}

impl<'a, T, A: Allocator + ?Sized> PoolBox<'a, T, A> {
  pub fn new(
    value: T,
    allocator: &TypedAllocator<'a, T, A>,
  ) -> Result<Self, AllocError> {
    let address = allocator.allocate(1)?;
    unsafe { address.write(value) };

    Ok(Self {
      value: address,
      allocator: *allocator,
    })
  }

  /// Moves the value out and releases its memory.
  ///
  /// The value is returned even when the allocator refuses to take the memory
  /// back; the refusal is logged, as on drop.
  pub fn into_inner(self) -> T {
    let this = mem::ManuallyDrop::new(self);

    let value = unsafe { this.value.read() };
    if let Err(err) = unsafe { this.allocator.deallocate(this.value, 1) } {
      error!(address = ?this.value, %err, "failed to release unboxed value");
    }
    value
  }

  pub fn allocator(&self) -> &TypedAllocator<'a, T, A> {
    &self.allocator
  }
}

impl<T, A: Allocator + ?Sized> Deref for PoolBox<'_, T, A> {
  type Target = T;

  fn deref(&self) -> &T {
    unsafe { self.value.as_ref() }
  }
}

impl<T, A: Allocator + ?Sized> DerefMut for PoolBox<'_, T, A> {
  fn deref_mut(&mut self) -> &mut T {
    unsafe { self.value.as_mut() }
  }
}

impl<T: fmt::Debug, A: Allocator + ?Sized> fmt::Debug for PoolBox<'_, T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    fmt::Debug::fmt(&**self, f)
  }
}

impl<T, A: Allocator + ?Sized> Drop for PoolBox<'_, T, A> {
  fn drop(&mut self) {
    unsafe {
      self.value.drop_in_place();

      if let Err(err) = self.allocator.deallocate(self.value, 1) {
        error!(address = ?self.value, %err, "failed to release boxed value");
      }
    }
  }
}
