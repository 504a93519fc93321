use std::mem;

/// In-place header of a free-list block.
///
/// The header of the next block is not stored: it sits right after this
/// block's payload, at `offset + HEADER_SIZE + size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Block {
  pub size: usize,
  pub is_free: bool,
}

impl Block {
  pub const HEADER_SIZE: usize = mem::size_of::<Block>();

  pub fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    Self { size, is_free }
  }

  /// Offset of the header that follows a block whose header is at `offset`.
  #[inline]
  pub fn next_offset(
    &self,
    offset: usize,
  ) -> usize {
    offset + Self::HEADER_SIZE + self.size
  }
}

/// In-place header of a stack allocator frame.
///
/// `previous` is the pool offset of the header allocated just before this
/// one, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct StackHeader {
  pub previous: Option<usize>,
  pub is_free: bool,
}

impl StackHeader {
  pub const HEADER_SIZE: usize = mem::size_of::<StackHeader>();

  pub fn new(previous: Option<usize>) -> Self {
    Self {
      previous,
      is_free: false,
    }
  }
}
