use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::{
  align::{check_alignment, padding_for},
  allocator::Allocator,
  block::StackHeader,
  config::PoolConfig,
  error::{AllocError, InvalidOperation},
  pool::Pool,
  system::SystemAllocator,
};

/// LIFO allocator over a fixed pool.
///
/// Each block is prefixed by a header linking back to the block
/// allocated before it:
///
/// ```text
///   ┌────────┬─────────┬───┬────────┬─────────┬───┬────────┬─────────┬──────────┐
///   │ hdr A  │ A data  │pad│ hdr B  │ B data  │pad│ hdr C  │ C data  │   free   │
///   └────────┴─────────┴───┴────────┴─────────┴───┴────────┴─────────┴──────────┘
///        ▲                     │ ▲                   │                ▲
///        └──── previous ───────┘ └──── previous ─────┘         current_offset
/// ```
///
/// Freeing the top block rewinds the cursor over every trailing block that is
/// already free. Freeing any other block only marks it; its space comes back
/// once every block above it has been freed too.
#[derive(Debug)]
pub struct StackAllocator<B: Allocator = SystemAllocator> {
  pool: Pool<B>,
  current_offset: usize,
  top: Option<usize>,
}

impl StackAllocator {
  /// Creates an allocator over `size` bytes taken from the system heap.
  pub fn new(size: usize) -> Result<Self, AllocError> {
    Self::with_backing(size, SystemAllocator::new())
  }

  pub fn from_config(config: &PoolConfig) -> Result<Self, AllocError> {
    Self::from_config_with_backing(config, SystemAllocator::new())
  }
}

impl<B: Allocator> StackAllocator<B> {
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
      top: None,
    })
  }

  /// Forgets every block at once.
  ///
  /// Addresses handed out before the reset still point into the pool and
  /// will be handed out again. Nothing is scrubbed.
  pub fn reset(&mut self) {
    debug!(released = self.current_offset, "stack allocator reset");
    self.current_offset = 0;
    self.top = None;
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

  /// True when no block is live.
  pub fn is_empty(&self) -> bool {
    self.top.is_none()
  }

  /// Maps a payload address back to the offset of its header.
  fn header_offset_of(
    &self,
    address: NonNull<u8>,
  ) -> Result<usize, AllocError> {
    let payload = (address.as_ptr() as usize)
      .checked_sub(self.pool.address_of(0))
      .filter(|&offset| offset >= StackHeader::HEADER_SIZE && offset <= self.current_offset)
      .ok_or(InvalidOperation::ForeignAddress)?;

    Ok(payload - StackHeader::HEADER_SIZE)
  }

  /// Walks the back-chain from `top` looking for `header_offset`.
  #[cfg(debug_assertions)]
  fn is_chained(
    &self,
    top: usize,
    header_offset: usize,
  ) -> bool {
    let mut cursor = Some(top);

    while let Some(offset) = cursor {
      if offset == header_offset {
        return true;
      }
      cursor = unsafe { self.pool.read::<StackHeader>(offset) }.previous;
    }

    false
  }
}

impl<B: Allocator> Allocator for StackAllocator<B> {
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_alignment(alignment)?;

    let padding = padding_for(
      self.pool.address_of(self.current_offset + StackHeader::HEADER_SIZE),
      alignment,
    );
    let header_offset = self.current_offset + padding;
    let payload = header_offset + StackHeader::HEADER_SIZE;

    let end = match payload.checked_add(size) {
      Some(end) if end <= self.pool.size() => end,
      _ => {
        warn!(size, alignment, remaining = self.remaining(), "stack allocator exhausted");
        return Err(AllocError::out_of_memory(size, alignment));
      }
    };

    unsafe { self.pool.write(header_offset, StackHeader::new(self.top)) };
    self.top = Some(header_offset);
    self.current_offset = end;

    let address = self.pool.ptr_at(payload);
    trace!(?address, size, alignment, "stack allocate");
    Ok(address)
  }

  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let Some(top) = self.top else {
      warn!(?address, "stack free with nothing allocated");
      return Err(InvalidOperation::NothingAllocated.into());
    };

    let header_offset = self.header_offset_of(address).inspect_err(|_| {
      warn!(?address, "stack free of a foreign address");
    })?;

    #[cfg(debug_assertions)]
    if !self.is_chained(top, header_offset) {
      warn!(?address, "stack free of an address that is not a block");
      return Err(InvalidOperation::ForeignAddress.into());
    }

    let mut header = unsafe { self.pool.read::<StackHeader>(header_offset) };
    if header.is_free {
      warn!(?address, "stack double free");
      return Err(InvalidOperation::DoubleFree.into());
    }

    header.is_free = true;
    unsafe { self.pool.write(header_offset, header) };
    trace!(?address, "stack free");

    if header_offset != top {
      return Ok(());
    }

    // Rewind over the run of free blocks that now sits on top of the stack.
    let mut lowest_free = header_offset;
    loop {
      match header.previous {
        None => {
          self.current_offset = 0;
          self.top = None;
          break;
        }
        Some(previous) => {
          let previous_header = unsafe { self.pool.read::<StackHeader>(previous) };

          if previous_header.is_free {
            lowest_free = previous;
            header = previous_header;
          } else {
            self.current_offset = lowest_free;
            self.top = Some(previous);
            break;
          }
        }
      }
    }

    trace!(current_offset = self.current_offset, "stack rewound");
    Ok(())
  }
}
