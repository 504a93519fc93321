//! Allocators drawing their pools from one another.

use std::cell::RefCell;

use rpools::{
  AllocError, Allocator, BitmapAllocator, FreeListAllocator, InvalidOperation, LinearAllocator,
  PoolBox, PoolConfig, StackAllocator, SystemAllocator, TypedAllocator, kibi, mebi,
};

#[test]
fn test_nested_pools_release_into_parent() {
  let mut parent = FreeListAllocator::new(mebi(1)).unwrap();

  {
    let mut stack = StackAllocator::with_backing(kibi(64), &mut parent).unwrap();
    let frame = stack.allocate(256, 32).unwrap();
    assert_eq!(frame.as_ptr() as usize % 32, 0);
  }
  {
    let mut linear = LinearAllocator::with_backing(kibi(64), &mut parent).unwrap();
    linear.allocate(kibi(64), 0).unwrap();
  }

  assert!(parent.blocks().all(|block| block.is_free));
  parent.defragment();
  assert_eq!(parent.blocks().count(), 1);
}

#[test]
fn test_three_levels() {
  let mut root = FreeListAllocator::new(mebi(1)).unwrap();
  let mut middle = FreeListAllocator::with_backing(kibi(256), &mut root).unwrap();
  let mut leaf = BitmapAllocator::<64, _>::with_backing(32, &mut middle).unwrap();

  let chunk = leaf.allocate(64, 16).unwrap();
  unsafe { leaf.free(chunk).unwrap() };

  drop(leaf);
  assert!(middle.blocks().all(|block| block.is_free));
}

#[test]
fn test_pool_too_large_for_parent() {
  let mut parent = FreeListAllocator::new(kibi(4)).unwrap();

  let result = StackAllocator::with_backing(kibi(8), &mut parent);
  assert_eq!(result.unwrap_err(), AllocError::PoolAcquisition { size: kibi(8) });
}

#[test]
fn test_dyn_allocators() {
  let mut allocators: Vec<Box<dyn Allocator>> = vec![
    Box::new(LinearAllocator::new(kibi(4)).unwrap()),
    Box::new(StackAllocator::new(kibi(4)).unwrap()),
    Box::new(BitmapAllocator::<128>::new(16).unwrap()),
    Box::new(FreeListAllocator::new(kibi(4)).unwrap()),
    Box::new(SystemAllocator::new()),
  ];

  for allocator in &mut allocators {
    let address = allocator.allocate(100, 16).unwrap();
    assert_eq!(address.as_ptr() as usize % 16, 0);

    unsafe { address.as_ptr().write_bytes(0xA5, 100) };
  }

  for allocator in &mut allocators {
    assert_eq!(
      allocator.allocate(100, 3),
      Err(AllocError::InvalidAlignment { alignment: 3 })
    );
  }
}

#[test]
fn test_shared_backing() {
  let shared = RefCell::new(FreeListAllocator::new(mebi(1)).unwrap());

  {
    let mut first = StackAllocator::with_backing(kibi(16), &shared).unwrap();
    let mut second = LinearAllocator::with_backing(kibi(16), &shared).unwrap();

    first.allocate(64, 0).unwrap();
    second.allocate(64, 0).unwrap();

    assert_eq!(shared.borrow().blocks().filter(|block| !block.is_free).count(), 2);
  }

  assert!(shared.borrow().blocks().all(|block| block.is_free));
}

#[test]
fn test_shared_backing_busy() {
  let shared = RefCell::new(FreeListAllocator::new(kibi(64)).unwrap());
  let _guard = shared.borrow_mut();

  let result = LinearAllocator::with_backing(kibi(1), &shared);
  assert_eq!(result.unwrap_err(), AllocError::PoolAcquisition { size: kibi(1) });

  let adapter = TypedAllocator::<u32, _>::new(&shared);
  assert_eq!(
    adapter.allocate(1),
    Err(AllocError::InvalidOperation(InvalidOperation::BackingBusy))
  );
}

#[test]
fn test_boxes_from_a_stack() {
  let frames = RefCell::new(StackAllocator::from_config(&PoolConfig::small()).unwrap());
  let adapter = TypedAllocator::new(&frames);

  {
    let outer = PoolBox::new([1u64; 4], &adapter).unwrap();
    let inner = PoolBox::new([2u64; 4], &adapter.rebind()).unwrap();

    assert_eq!(outer.iter().sum::<u64>(), 4);
    assert_eq!(inner.iter().sum::<u64>(), 8);
  }

  assert!(frames.borrow().is_empty());
}
