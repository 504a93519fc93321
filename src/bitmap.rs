use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::{
  align::check_alignment,
  allocator::Allocator,
  config::PoolConfig,
  error::{AllocError, InvalidOperation},
  pool::Pool,
  system::SystemAllocator,
};

/// Fixed-size slot allocator.
///
/// The pool holds `chunk_count` chunks of `CHUNK_SIZE` bytes followed by the
/// occupancy bitmap, one bit per chunk rounded up to whole bytes:
///
/// ```text
///   ┌─────────┬─────────┬─────────┬─────┬─────────┬────────────────┐
///   │ chunk 0 │ chunk 1 │ chunk 2 │ ... │ chunk N │ bitmap (N/8 B) │
///   └─────────┴─────────┴─────────┴─────┴─────────┴────────────────┘
/// ```
///
/// Allocation scans the bitmap starting just after the chunk served last, so
/// a steady allocate/free pattern rotates through the pool instead of
/// hammering the first chunks.
#[derive(Debug)]
pub struct BitmapAllocator<const CHUNK_SIZE: usize, B: Allocator = SystemAllocator> {
  pool: Pool<B>,
  chunk_count: usize,
  bitmap_offset: usize,
  chunk_alignment: usize,
  scan_cursor: Option<usize>,
}

impl<const CHUNK_SIZE: usize> BitmapAllocator<CHUNK_SIZE> {
  /// Creates an allocator with `chunk_count` chunks taken from the system
  /// heap.
  pub fn new(chunk_count: usize) -> Result<Self, AllocError> {
    Self::with_backing(chunk_count, SystemAllocator::new())
  }

  pub fn from_config(config: &PoolConfig) -> Result<Self, AllocError> {
    Self::from_config_with_backing(config, SystemAllocator::new())
  }
}

impl<const CHUNK_SIZE: usize, B: Allocator> BitmapAllocator<CHUNK_SIZE, B> {
  /// Creates an allocator with `chunk_count` chunks taken from `backing`.
  pub fn with_backing(
    chunk_count: usize,
    backing: B,
  ) -> Result<Self, AllocError> {
    Self::from_config_with_backing(&PoolConfig::default().with_chunk_count(chunk_count), backing)
  }

  pub fn from_config_with_backing(
    config: &PoolConfig,
    backing: B,
  ) -> Result<Self, AllocError> {
    const { assert!(CHUNK_SIZE > 0, "chunk size must not be zero") };

    let chunk_count = config.chunk_count;
    let bitmap_offset = chunk_count
      .checked_mul(CHUNK_SIZE)
      .ok_or(AllocError::PoolAcquisition { size: usize::MAX })?;
    let bitmap_len = chunk_count.div_ceil(8);

    let size = if chunk_count == 0 {
      0
    } else {
      bitmap_offset
        .checked_add(bitmap_len)
        .ok_or(AllocError::PoolAcquisition { size: usize::MAX })?
    };
    let mut pool = Pool::acquire(size, config.backing_alignment, backing)?;

    // Every chunk starts at `base + i * CHUNK_SIZE`, so the lowest set bit of
    // either term bounds the alignment all chunks share.
    let chunk_alignment = 1usize << (pool.base().as_ptr() as usize | CHUNK_SIZE).trailing_zeros();

    unsafe { pool.fill(bitmap_offset, bitmap_len, 0) };

    debug!(chunk_count, chunk_size = CHUNK_SIZE, chunk_alignment, "bitmap allocator ready");

    Ok(Self {
      pool,
      chunk_count,
      bitmap_offset,
      chunk_alignment,
      scan_cursor: None,
    })
  }

  /// Serves one chunk.
  pub fn allocate_chunk(&mut self) -> Result<NonNull<u8>, AllocError> {
    let start = self.scan_cursor.map_or(0, |cursor| (cursor + 1) % self.chunk_count);
    let mut index = start;

    loop {
      if !self.is_allocated(index) {
        self.set_bit(index, true);
        self.scan_cursor = Some(index);

        let address = self.pool.ptr_at(index * CHUNK_SIZE);
        trace!(?address, index, "bitmap allocate");
        return Ok(address);
      }

      index = (index + 1) % self.chunk_count;
      if index == start {
        warn!(chunk_count = self.chunk_count, "bitmap allocator exhausted");
        return Err(AllocError::out_of_memory(CHUNK_SIZE, 0));
      }
    }
  }

  /// Clears every bit and forgets the scan cursor.
  ///
  /// Addresses handed out before the reset will be handed out again.
  pub fn reset(&mut self) {
    debug!(allocated = self.allocated_count(), "bitmap allocator reset");
    unsafe { self.pool.fill(self.bitmap_offset, self.chunk_count.div_ceil(8), 0) };
    self.scan_cursor = None;
  }

  pub fn is_allocated(
    &self,
    index: usize,
  ) -> bool {
    debug_assert!(index < self.chunk_count);
    let byte = unsafe { self.pool.read::<u8>(self.bitmap_offset + index / 8) };
    byte & (1 << (index % 8)) != 0
  }

  /// Number of chunks currently handed out.
  pub fn allocated_count(&self) -> usize {
    (0..self.chunk_count.div_ceil(8))
      .map(|byte| unsafe { self.pool.read::<u8>(self.bitmap_offset + byte) }.count_ones() as usize)
      .sum()
  }

  pub fn chunk_count(&self) -> usize {
    self.chunk_count
  }

  /// Alignment every chunk address is guaranteed to satisfy.
  pub fn chunk_alignment(&self) -> usize {
    self.chunk_alignment
  }

  pub fn pool_size(&self) -> usize {
    self.pool.size()
  }

  pub fn base(&self) -> NonNull<u8> {
    self.pool.base()
  }

  fn set_bit(
    &mut self,
    index: usize,
    allocated: bool,
  ) {
    let offset = self.bitmap_offset + index / 8;
    let mask = 1u8 << (index % 8);

    let byte = unsafe { self.pool.read::<u8>(offset) };
    let byte = if allocated { byte | mask } else { byte & !mask };
    unsafe { self.pool.write(offset, byte) };
  }
}

impl<const CHUNK_SIZE: usize, B: Allocator> Allocator for BitmapAllocator<CHUNK_SIZE, B> {
  /// Serves one chunk when it can hold `size` bytes at `alignment`.
  fn allocate(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    check_alignment(alignment)?;

    if size > CHUNK_SIZE || alignment > self.chunk_alignment {
      warn!(size, alignment, chunk_size = CHUNK_SIZE, "request does not fit a chunk");
      return Err(AllocError::out_of_memory(size, alignment));
    }

    self.allocate_chunk()
  }

  unsafe fn free(
    &mut self,
    address: NonNull<u8>,
  ) -> Result<(), AllocError> {
    let Some(index) = self
      .pool
      .offset_of(address)
      .filter(|&offset| offset < self.bitmap_offset && offset % CHUNK_SIZE == 0)
      .map(|offset| offset / CHUNK_SIZE)
    else {
      warn!(?address, "bitmap free of a foreign address");
      return Err(InvalidOperation::ForeignAddress.into());
    };

    if !self.is_allocated(index) {
      warn!(?address, index, "bitmap double free");
      return Err(InvalidOperation::DoubleFree.into());
    }

    self.set_bit(index, false);
    trace!(?address, index, "bitmap free");
    Ok(())
  }
}
