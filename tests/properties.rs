//! Property tests for the pool allocators' layout invariants.

use std::ptr::NonNull;

use proptest::prelude::*;
use rpools::{
  Allocator, BitmapAllocator, FreeListAllocator, HEADER_SIZE, LinearAllocator, StackAllocator,
  kibi,
};

const ALIGNMENTS: [usize; 5] = [0, 8, 16, 32, 64];

#[derive(Debug, Clone)]
enum Op {
  Allocate { size: usize, alignment: usize },
  Free { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (1usize..600, prop::sample::select(ALIGNMENTS.to_vec()))
      .prop_map(|(size, alignment)| Op::Allocate { size, alignment }),
    2 => any::<usize>().prop_map(|pick| Op::Free { pick }),
  ]
}

fn sized_requests(
  max_size: usize,
  max_len: usize,
) -> impl Strategy<Value = Vec<(usize, usize)>> {
  prop::collection::vec((1..max_size, prop::sample::select(ALIGNMENTS.to_vec())), 1..max_len)
}

/// Headers tile the pool: stepping block by block from the first header lands
/// exactly on the pool end.
fn assert_tiled(allocator: &FreeListAllocator) {
  let blocks: Vec<_> = allocator.blocks().collect();
  let first = blocks[0].offset;

  for pair in blocks.windows(2) {
    assert_eq!(pair[0].offset + HEADER_SIZE + pair[0].size, pair[1].offset);
  }

  let covered: usize = blocks.iter().map(|block| HEADER_SIZE + block.size).sum();
  assert_eq!(first + covered, allocator.pool_size());
}

fn assert_disjoint(live: &[(NonNull<u8>, usize)]) {
  let mut ranges: Vec<_> = live
    .iter()
    .map(|&(address, size)| (address.as_ptr() as usize, address.as_ptr() as usize + size))
    .collect();
  ranges.sort_unstable();

  for pair in ranges.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "{:x?} overlaps {:x?}", pair[0], pair[1]);
  }
}

fn assert_aligned(
  address: NonNull<u8>,
  alignment: usize,
) {
  if alignment != 0 {
    assert_eq!(address.as_ptr() as usize % alignment, 0);
  }
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(128))]

  #[test]
  fn free_list_keeps_tiling_and_disjoint_blocks(ops in prop::collection::vec(op(), 1..80)) {
    let mut allocator = FreeListAllocator::new(kibi(16)).unwrap();
    let mut live = Vec::new();

    for op in ops {
      match op {
        Op::Allocate { size, alignment } => {
          if let Ok(address) = allocator.allocate(size, alignment) {
            assert_aligned(address, alignment);
            live.push((address, size));
          }
        }
        Op::Free { pick } if !live.is_empty() => {
          let (address, _) = live.swap_remove(pick % live.len());
          unsafe { allocator.free(address).unwrap() };
        }
        Op::Free { .. } => {}
      }

      assert_tiled(&allocator);
      assert_disjoint(&live);
    }

    // Live blocks survive a defragmentation untouched.
    allocator.defragment();
    assert_tiled(&allocator);
    for &(address, _) in &live {
      let payload = address.as_ptr() as usize - allocator.base().as_ptr() as usize;
      prop_assert!(
        allocator
          .blocks()
          .any(|block| block.payload_offset() == payload && !block.is_free)
      );
    }
  }

  #[test]
  fn free_list_defragment_is_idempotent(
    sizes in prop::collection::vec(1usize..256, 1..40),
    freed in prop::collection::vec(any::<bool>(), 40),
  ) {
    let mut allocator = FreeListAllocator::new(kibi(16)).unwrap();
    let addresses: Vec<_> = sizes
      .iter()
      .map(|&size| allocator.allocate(size, 0).unwrap())
      .collect();

    for (address, free) in addresses.iter().zip(&freed) {
      if *free {
        unsafe { allocator.free(*address).unwrap() };
      }
    }

    allocator.defragment();
    let layout: Vec<_> = allocator.blocks().collect();

    prop_assert_eq!(allocator.defragment(), 0);
    prop_assert_eq!(allocator.blocks().collect::<Vec<_>>(), layout);

    // No two free blocks are left side by side.
    let blocks: Vec<_> = allocator.blocks().collect();
    for pair in blocks.windows(2) {
      prop_assert!(!(pair[0].is_free && pair[1].is_free));
    }
  }

  #[test]
  fn free_list_merges_back_to_one_block(
    requests in sized_requests(300, 30),
  ) {
    let mut allocator = FreeListAllocator::new(kibi(16)).unwrap();
    let addresses: Vec<_> = requests
      .iter()
      .map(|&(size, alignment)| allocator.allocate(size, alignment).unwrap())
      .collect();

    for address in addresses.into_iter().rev() {
      unsafe { allocator.free(address).unwrap() };
    }
    allocator.defragment();

    let blocks: Vec<_> = allocator.blocks().collect();
    prop_assert_eq!(blocks.len(), 1);
    prop_assert_eq!(blocks[0].offset, 0);
    prop_assert_eq!(blocks[0].size, kibi(16) - HEADER_SIZE);
  }

  #[test]
  fn free_list_round_trip_reuses_address(
    prefix in prop::collection::vec(1usize..200, 0..10),
    size in 1usize..500,
    alignment in prop::sample::select(ALIGNMENTS.to_vec()),
  ) {
    let mut allocator = FreeListAllocator::new(kibi(8)).unwrap();
    for size in prefix {
      allocator.allocate(size, 0).unwrap();
    }

    // Fill the rest of the pool so the only fitting block is the freed one.
    let address = allocator.allocate(size, alignment).unwrap();
    while allocator.allocate(1, 0).is_ok() {}

    unsafe { allocator.free(address).unwrap() };
    prop_assert_eq!(allocator.allocate(size, alignment).unwrap(), address);
  }

  #[test]
  fn stack_honours_alignment_and_unwinds(
    requests in sized_requests(200, 40),
  ) {
    let mut stack = StackAllocator::new(kibi(16)).unwrap();
    let mut live = Vec::new();

    for (size, alignment) in requests {
      let address = stack.allocate(size, alignment).unwrap();
      assert_aligned(address, alignment);
      live.push((address, size));
    }
    assert_disjoint(&live);

    for (address, _) in live.into_iter().rev() {
      unsafe { stack.free(address).unwrap() };
    }
    prop_assert!(stack.is_empty());
    prop_assert_eq!(stack.current_offset(), 0);
  }

  #[test]
  fn linear_reset_replays_the_same_addresses(
    requests in sized_requests(100, 50),
  ) {
    let mut allocator = LinearAllocator::new(kibi(8)).unwrap();

    let first: Vec<_> = requests
      .iter()
      .map(|&(size, alignment)| allocator.allocate(size, alignment))
      .collect();
    allocator.reset();
    let second: Vec<_> = requests
      .iter()
      .map(|&(size, alignment)| allocator.allocate(size, alignment))
      .collect();

    prop_assert_eq!(first, second);
  }

  #[test]
  fn bitmap_never_hands_out_a_chunk_twice(
    ops in prop::collection::vec(any::<Option<usize>>(), 1..100),
  ) {
    let mut bitmap = BitmapAllocator::<24>::new(13).unwrap();
    let mut live = Vec::new();

    for op in ops {
      match op {
        None => match bitmap.allocate_chunk() {
          Ok(chunk) => {
            prop_assert!(!live.contains(&chunk));
            live.push(chunk);
          }
          Err(_) => {
            prop_assert_eq!(live.len(), 13);
          }
        },
        Some(pick) if !live.is_empty() => {
          let chunk = live.swap_remove(pick % live.len());
          unsafe { bitmap.free(chunk).unwrap() };
        }
        Some(_) => {}
      }

      prop_assert_eq!(bitmap.allocated_count(), live.len());
    }
  }
}
