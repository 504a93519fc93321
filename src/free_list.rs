//! General purpose allocator with in-place block headers.
//!
//! The pool is tiled by blocks. Every block starts with a header
//! recording the size of its payload and whether it is free. Headers do not
//! link to each other: the next header always sits right after the current
//! payload, so walking the pool is pure arithmetic.
//!
//! ```text
//!   first                                                            pool end
//!   ▼                                                                       ▼
//!   ┌──────┬──────────┬──────┬───────────────┬──────┬──────┬──────┬─────────┐
//!   │ hdr  │ payload  │ hdr  │   payload     │ hdr  │ pay. │ hdr  │ payload │
//!   │ used │          │ free │               │ used │      │ free │         │
//!   └──────┴──────────┴──────┴───────────────┴──────┴──────┴──────┴─────────┘
//!   │◄─ 16 + size ───►│◄──── 16 + size ─────►│ ...
//! ```
//!
//! Stepping from the first header by `HEADER_SIZE + size` must land exactly on
//! the pool end. Every operation preserves this tiling; debug builds check it
//! after each mutation.
//!
//! ## Allocation
//!
//! Search is **next-fit**: it resumes right after the block served last and
//! wraps around at the pool end, so the front of the pool is not rescanned on
//! every request. The first free block that can hold the request, including
//! the padding needed to align its payload, is served.
//!
//! Alignment padding is handed to the block in front of the served one by
//! growing its payload, and the served header moves forward by the same
//! amount. The first block has nobody in front of it, so its header is moved
//! forward alone and the skipped bytes stay unused until the block is free
//! again and [`FreeListAllocator::defragment`] re-homes it.
//!
//! When the served block has room to spare, the rest is split off into a new
//! free block. Remainders too small to ever be useful are left attached to the
//! served block instead.
//!
//! ## Freeing
//!
//! Freeing only flips the header flag. Neighbouring free blocks are merged in
//! one pass by [`FreeListAllocator::defragment`] when the caller decides it
//! is worth it.

use std::{iter, mem, ptr::NonNull};

use tracing::{debug, trace, warn};

use crate::{
  align,
  align::{check_alignment, padding_for},
  allocator::Allocator,
  block::Block,
  config::PoolConfig,
  error::{AllocError, InvalidOperation},
  pool::Pool,
  system::SystemAllocator,
};

/// Bytes of bookkeeping in front of every block's payload.
pub const HEADER_SIZE: usize = Block::HEADER_SIZE;

const HEADER: usize = HEADER_SIZE;

/// Smallest payload a block split off the end of a served block may have.
pub const MIN_CHUNK_SIZE: usize = mem::size_of::<usize>();

/// Snapshot of one block, as reported by [`FreeListAllocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header from the pool base.
  pub offset: usize,
  /// Payload size in bytes.
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  /// Offset of the first payload byte from the pool base.
  pub fn payload_offset(&self) -> usize {
    self.offset + HEADER
  }
}

#[derive(Debug)]
pub struct FreeListAllocator<B: Allocator = SystemAllocator> {
  pool: Pool<B>,
  /// Offset of the first header. Only non-zero after the first block was
  /// moved forward to align its payload.
  first: usize,
  /// Header served last; the next search starts right after it.
  last_served: Option<usize>,
}

impl FreeListAllocator {
  /// Creates an allocator over `size` bytes taken from the system heap.
  pub fn new(size: usize) -> Result<Self, AllocError> {
    Self::with_backing(size, SystemAllocator::new())
  }

  pub fn from_config(config: &PoolConfig) -> Result<Self, AllocError> {
    Self::from_config_with_backing(config, SystemAllocator::new())
  }
}

impl<B: Allocator> FreeListAllocator<B> {
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
    let size = config.pool_size;
    if size < HEADER + MIN_CHUNK_SIZE {
      return Err(AllocError::PoolAcquisition { size });
    }

    let mut pool = Pool::acquire(size, config.backing_alignment, backing)?;
    unsafe { pool.write(0, Block::new(size - HEADER, true)) };

    Ok(Self {
      pool,
      first: 0,
      last_served: None,
    })
  }

  /// Merges every run of adjacent free blocks into a single block.
  ///
  /// Nothing moves: addresses of live blocks stay valid. Returns the number of
  /// merges performed.
  pub fn defragment(&mut self) -> usize {
    let mut merges = 0;

    if self.first != 0 {
      let block = self.header(self.first);

      if block.is_free {
        self.set_header(0, Block::new(block.size + self.first, true));
        if self.last_served == Some(self.first) {
          self.last_served = Some(0);
        }
        self.first = 0;
      }
    }

    let mut offset = self.first;
    loop {
      let mut block = self.header(offset);
      let next = block.next_offset(offset);
      if next >= self.pool.size() {
        break;
      }

      let next_block = self.header(next);
      if block.is_free && next_block.is_free {
        block.size += HEADER + next_block.size;
        self.set_header(offset, block);

        if self.last_served == Some(next) {
          self.last_served = Some(offset);
        }
        merges += 1;
        // The grown block may merge with the one after it as well.
      } else {
        offset = next;
      }
    }

    debug_assert!(self.is_tiled());
    debug!(merges, "free list defragmented");
    merges
  }

  /// Marks every block free and merges them back into one block spanning the
  /// whole pool.
  ///
  /// Addresses handed out before the reset will be handed out again. Nothing
  /// is scrubbed.
  pub fn reset(&mut self) {
    let mut offset = self.first;
    while offset < self.pool.size() {
      let mut block = self.header(offset);
      block.is_free = true;
      self.set_header(offset, block);
      offset = block.next_offset(offset);
    }

    self.defragment();
    self.last_served = None;

    debug!(pool_size = self.pool.size(), "free list reset");
  }

  /// Walks every block from the first header to the pool end.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    iter::successors(Some(self.first), |&offset| {
      let next = self.header(offset).next_offset(offset);
      (next < self.pool.size()).then_some(next)
    })
    .map(|offset| {
      let block = self.header(offset);
      BlockInfo {
        offset,
        size: block.size,
        is_free: block.is_free,
      }
    })
  }

  /// Total payload bytes held by free blocks.
  pub fn free_bytes(&self) -> usize {
    self.blocks().filter(|block| block.is_free).map(|block| block.size).sum()
  }

  pub fn pool_size(&self) -> usize {
    self.pool.size()
  }

  pub fn base(&self) -> NonNull<u8> {
    self.pool.base()
  }

  #[inline]
  fn header(
    &self,
    offset: usize,
  ) -> Block {
    unsafe { self.pool.read::<Block>(offset) }
  }

  #[inline]
  fn set_header(
    &mut self,
    offset: usize,
    block: Block,
  ) {
    debug_assert!(offset + HEADER + block.size <= self.pool.size());
    unsafe { self.pool.write(offset, block) };
  }

  /// Steps through the chain and checks that it ends exactly on the pool end.
  fn is_tiled(&self) -> bool {
    let mut offset = self.first;
    while offset < self.pool.size() {
      offset = self.header(offset).next_offset(offset);
    }
    offset == self.pool.size()
  }

  /// Turns the free block at `offset` into a used block of `size` bytes whose
  /// payload starts `padding` bytes later than it does now.
  fn serve(
    &mut self,
    mut offset: usize,
    previous: Option<usize>,
    mut capacity: usize,
    padding: usize,
    size: usize,
  ) -> usize {
    if padding > 0 {
      match previous {
        Some(previous) => {
          let mut block = self.header(previous);
          block.size += padding;
          self.set_header(previous, block);
        }
        None => {
          debug_assert_eq!(offset, self.first);
          self.first = offset + padding;
        }
      }

      offset += padding;
      capacity -= padding;
    }

    let remainder = capacity - size;
    let served = if remainder >= HEADER + MIN_CHUNK_SIZE {
      self.set_header(offset + HEADER + size, Block::new(remainder - HEADER, true));
      size
    } else {
      capacity
    };

    self.set_header(offset, Block::new(served, false));
    self.last_served = Some(offset);

    debug_assert!(self.is_tiled());
    offset
  }
}

impl<B: Allocator> Allocator for FreeListAllocator<B> {
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_alignment(alignment)?;

    if size > self.pool.size() {
      warn!(size, alignment, "request larger than the free list pool");
      return Err(AllocError::out_of_memory(size, alignment));
    }
    let aligned_size = align!(size.max(1));

    // Start after the block served last; that block is visited last.
    let (start, start_previous) = match self.last_served {
      Some(cursor) => {
        let next = self.header(cursor).next_offset(cursor);
        if next == self.pool.size() { (self.first, None) } else { (next, Some(cursor)) }
      }
      None => (self.first, None),
    };

    let mut offset = start;
    let mut previous = start_previous;

    loop {
      let block = self.header(offset);

      if block.is_free {
        let padding = padding_for(self.pool.address_of(offset + HEADER), alignment);

        if block.size >= padding + aligned_size {
          let served = self.serve(offset, previous, block.size, padding, aligned_size);

          let address = self.pool.ptr_at(served + HEADER);
          trace!(?address, size, alignment, "free list allocate");
          return Ok(address);
        }
      }

      let next = block.next_offset(offset);
      (offset, previous) = if next == self.pool.size() {
        (self.first, None)
      } else {
        (next, Some(offset))
      };

      if offset == start {
        warn!(size, alignment, free_bytes = self.free_bytes(), "free list exhausted");
        return Err(AllocError::out_of_memory(size, alignment));
      }
    }
  }

  /// Marks the block free without merging it with its neighbours.
  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let Some(offset) = self
      .pool
      .offset_of(address)
      .filter(|&payload| payload >= self.first + HEADER)
      .map(|payload| payload - HEADER)
    else {
      warn!(?address, "free list free of a foreign address");
      return Err(InvalidOperation::ForeignAddress.into());
    };

    #[cfg(debug_assertions)]
    if !self.blocks().any(|block| block.offset == offset) {
      warn!(?address, "free list free of an address that is not a block");
      return Err(InvalidOperation::ForeignAddress.into());
    }

    let mut block = self.header(offset);
    if block.is_free {
      warn!(?address, "free list double free");
      return Err(InvalidOperation::DoubleFree.into());
    }

    block.is_free = true;
    self.set_header(offset, block);

    trace!(?address, size = block.size, "free list free");
    Ok(())
  }
}
