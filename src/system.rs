use std::{mem, ptr::NonNull};

use libc::c_void;

use crate::{allocator::Allocator, error::AllocError};

/// Alignment every `malloc` result is guaranteed to have.
const MALLOC_ALIGNMENT: usize = 2 * mem::size_of::<usize>();

/// Forwards to the platform heap (`malloc`, `posix_memalign` and `free`).
///
/// This is the default backing source of every pool allocator and the
/// template for wrapping any other platform allocator: it carries no state,
/// so each pool owns its own instance and releases its memory exactly once.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SystemAllocator {
  pub const fn new() -> Self {
    Self
  }
}

impl Allocator for SystemAllocator {
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    crate::align::check_alignment(alignment)?;

    // malloc(0) may legally return null; always ask for at least one byte.
    let size = size.max(1);

    let address = if alignment <= MALLOC_ALIGNMENT {
      unsafe { libc::malloc(size) }
    } else {
      // posix_memalign wants a multiple of the pointer size.
      let alignment = alignment.max(mem::size_of::<*mut c_void>());
      let mut address: *mut c_void = std::ptr::null_mut();

      match unsafe { libc::posix_memalign(&mut address, alignment, size) } {
        0 => address,
        _ => std::ptr::null_mut(),
      }
    };

    NonNull::new(address.cast::<u8>()).ok_or(AllocError::out_of_memory(size, alignment))
  }

  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    unsafe { libc::free(address.as_ptr().cast::<c_void>()) };
    Ok(())
  }
}
