//! Errors reported by every allocator in the crate.

/// Errors that can occur while acquiring a pool or serving requests from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  #[error("out of memory: cannot serve {requested} bytes with alignment {alignment}")]
  OutOfMemory { requested: usize, alignment: usize },

  #[error("invalid operation: {0}")]
  InvalidOperation(#[from] InvalidOperation),

  #[error("invalid alignment: {alignment} is not a power of two")]
  InvalidAlignment { alignment: usize },

  #[error("failed to acquire a pool of {size} bytes")]
  PoolAcquisition { size: usize },
}

/// Misuse of an allocator by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOperation {
  #[error("this allocator cannot free individual blocks")]
  FreeUnsupported,

  #[error("address was not handed out by this allocator")]
  ForeignAddress,

  #[error("nothing is currently allocated")]
  NothingAllocated,

  #[error("block is already free")]
  DoubleFree,

  #[error("backing allocator is already in use")]
  BackingBusy,
}

impl AllocError {
  pub(crate) fn out_of_memory(
    requested: usize,
    alignment: usize,
  ) -> Self {
    Self::OutOfMemory { requested, alignment }
  }
}
