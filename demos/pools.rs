use std::{io::Read, ptr::NonNull};

use rpools::{
  AllocError, Allocator, BitmapAllocator, FreeListAllocator, LinearAllocator, PoolBox,
  StackAllocator, TypedAllocator, kibi,
};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps. Set `RPOOLS_DEMO_NO_PAUSE` to run straight through.
fn block_until_enter_pressed() {
  if std::env::var_os("RPOOLS_DEMO_NO_PAUSE").is_some() {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints where a block landed relative to its pool.
fn print_alloc(
  label: &str,
  base: NonNull<u8>,
  address: NonNull<u8>,
  size: usize,
  alignment: usize,
) {
  println!(
    "{label}: {size} bytes (align {alignment}) at {address:?}, pool offset {}",
    address.as_ptr() as usize - base.as_ptr() as usize
  );
}

fn print_blocks(free_list: &FreeListAllocator) {
  for block in free_list.blocks() {
    println!(
      "    header @ {:>5}  size {:>5}  {}",
      block.offset,
      block.size,
      if block.is_free { "free" } else { "used" }
    );
  }
}

fn main() -> Result<(), AllocError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  // --------------------------------------------------------------------
  // 1) Linear: the cursor only moves forward until reset.
  // --------------------------------------------------------------------
  let mut linear = LinearAllocator::new(kibi(1))?;
  println!("\n[1] Linear allocator over {} bytes", linear.pool_size());

  let first = linear.allocate(3, 0)?;
  print_alloc("[1] u8[3]", linear.base(), first, 3, 0);
  let second = linear.allocate(8, 8)?;
  print_alloc("[1] u64  ", linear.base(), second, 8, 8);

  match unsafe { linear.free(second) } {
    Ok(()) => println!("[1] free succeeded?"),
    Err(err) => println!("[1] free refused: {err}"),
  }

  linear.reset();
  println!("[1] after reset, cursor = {}", linear.current_offset());

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Stack: freeing the top rewinds over blocks already freed below it.
  // --------------------------------------------------------------------
  let mut stack = StackAllocator::new(kibi(1))?;
  println!("\n[2] Stack allocator over {} bytes", stack.pool_size());

  let a = stack.allocate(32, 16)?;
  let b = stack.allocate(32, 16)?;
  let c = stack.allocate(32, 16)?;
  for (label, address) in [("[2] A", a), ("[2] B", b), ("[2] C", c)] {
    print_alloc(label, stack.base(), address, 32, 16);
  }

  unsafe {
    stack.free(b)?;
    println!("[2] freed B, cursor = {}", stack.current_offset());
    stack.free(c)?;
    println!("[2] freed C, cursor = {} (rewound over B)", stack.current_offset());
    stack.free(a)?;
    println!("[2] freed A, empty = {}", stack.is_empty());
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Bitmap: fixed-size chunks tracked by one bit each.
  // --------------------------------------------------------------------
  let mut bitmap = BitmapAllocator::<64>::new(4)?;
  println!("\n[3] Bitmap allocator with {} chunks of 64 bytes", bitmap.chunk_count());

  let chunks = (0..4).map(|_| bitmap.allocate_chunk()).collect::<Result<Vec<_>, _>>()?;
  for chunk in &chunks {
    print_alloc("[3] chunk", bitmap.base(), *chunk, 64, 0);
  }

  if let Err(err) = bitmap.allocate_chunk() {
    println!("[3] fifth chunk: {err}");
  }

  unsafe { bitmap.free(chunks[2])? };
  let reused = bitmap.allocate_chunk()?;
  println!("[3] freed chunk 2 and got it back: {}", reused == chunks[2]);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Free list: split, alignment padding, fragmentation, defragment.
  // --------------------------------------------------------------------
  let mut free_list = FreeListAllocator::new(kibi(1))?;
  println!("\n[4] Free-list allocator over {} bytes", free_list.pool_size());

  let x = free_list.allocate(100, 0)?;
  let y = free_list.allocate(100, 64)?;
  let z = free_list.allocate(100, 0)?;
  print_alloc("[4] X", free_list.base(), x, 100, 0);
  print_alloc("[4] Y", free_list.base(), y, 100, 64);
  print_alloc("[4] Z", free_list.base(), z, 100, 0);
  print_blocks(&free_list);

  unsafe {
    free_list.free(x)?;
    free_list.free(y)?;
  }
  println!("[4] freed X and Y");
  print_blocks(&free_list);

  let merges = free_list.defragment();
  println!("[4] defragment merged {merges} pair(s)");
  print_blocks(&free_list);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Nesting and typed values: a stack drawing from the free list.
  // --------------------------------------------------------------------
  {
    let frames = std::cell::RefCell::new(StackAllocator::with_backing(256, &mut free_list)?);
    let words = TypedAllocator::new(&frames);

    let boxed = PoolBox::new([7u32; 8], &words)?;
    println!("\n[5] PoolBox on a nested stack holds {:?}", *boxed);
  }
  println!("[5] nested pool returned to the free list:");
  print_blocks(&free_list);

  println!("\n[6] End of demo. Every pool goes back to the system heap on drop.");
  Ok(())
}
