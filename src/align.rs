use crate::error::AllocError;

/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use rpools::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// ```rust
/// use rpools::align_to;
///
/// assert_eq!(align_to!(13, 32), 32);
/// assert_eq!(align_to!(64, 32), 64);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Number of bytes that must be skipped from `address` so that the result is
/// a multiple of `alignment`.
///
/// An alignment of 0 means "no requirement" and always yields 0.
#[inline]
pub fn padding_for(
  address: usize,
  alignment: usize,
) -> usize {
  if alignment == 0 {
    return 0;
  }

  let misalignment = address & (alignment - 1);
  if misalignment == 0 { 0 } else { alignment - misalignment }
}

/// Rejects alignments that are neither 0 nor a power of two.
#[inline]
pub(crate) fn check_alignment(alignment: usize) -> Result<(), AllocError> {
  if alignment == 0 || alignment.is_power_of_two() {
    Ok(())
  } else {
    Err(AllocError::InvalidAlignment { alignment })
  }
}
