//! # rpools - Pool Allocators over a Single Contiguous Region
//!
//! This crate provides four allocators that each carve requests out of one
//! fixed **pool** obtained up front from a backing allocator (the system heap
//! by default):
//!
//! ```text
//!   Backing allocator (system heap, or any other Allocator)
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                                                                      │
//!   │   pool = backing.allocate(pool_size, backing_alignment)              │
//!   │   ┌────────────────────────────────────────────────────────────────┐ │
//!   │   │ A1 │ A2 │   A3   │ A4 │              not yet served            │ │
//!   │   └────────────────────────────────────────────────────────────────┘ │
//!   │   ▲                                                              ▲   │
//!   │   base                                                  base + size  │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Dropping the allocator hands the pool back to its backing allocator.
//! ```
//!
//! | Allocator             | Frees            | Bookkeeping                    |
//! |-----------------------|------------------|--------------------------------|
//! | [`LinearAllocator`]   | only via `reset` | one cursor                     |
//! | [`StackAllocator`]    | LIFO, cascading  | header with a back-link        |
//! | [`BitmapAllocator`]   | any chunk        | one bit per fixed-size chunk   |
//! | [`FreeListAllocator`] | any block        | size + free flag per block     |
//!
//! ## Crate Structure
//!
//! ```text
//!   rpools
//!   ├── align      - Alignment macros (align!, align_to!) and padding math
//!   ├── allocator  - The Allocator capability and its forwarding impls
//!   ├── system     - SystemAllocator, the default backing source
//!   ├── pool       - The contiguous region and its in-place read/write
//!   ├── block      - In-place headers (internal)
//!   ├── bump       - LinearAllocator
//!   ├── stack      - StackAllocator
//!   ├── bitmap     - BitmapAllocator
//!   ├── free_list  - FreeListAllocator
//!   ├── adapter    - TypedAllocator and PoolBox
//!   ├── config     - PoolConfig
//!   ├── size       - kibi/mebi/gibi and defaults
//!   └── error      - AllocError, InvalidOperation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpools::{Allocator, FreeListAllocator, kibi};
//!
//! let mut allocator = FreeListAllocator::new(kibi(4)).unwrap();
//!
//! unsafe {
//!     let ptr = allocator.allocate(8, 8).unwrap().cast::<u64>();
//!
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!
//!     allocator.free(ptr.cast()).unwrap();
//! }
//! ```
//!
//! ## Composition
//!
//! Every allocator implements [`Allocator`] itself, so one pool can be drawn
//! from another:
//!
//! ```text
//!   SystemAllocator
//!   └── FreeListAllocator<SystemAllocator>        (4 MiB)
//!       ├── StackAllocator<&mut FreeListAllocator>   (64 KiB)
//!       └── ...
//! ```
//!
//! ```rust
//! use rpools::{Allocator, FreeListAllocator, StackAllocator, kibi, mebi};
//!
//! let mut parent = FreeListAllocator::new(mebi(4)).unwrap();
//! {
//!     let mut frames = StackAllocator::with_backing(kibi(64), &mut parent).unwrap();
//!     frames.allocate(128, 16).unwrap();
//! }
//! // The stack's pool went back to the parent when `frames` was dropped.
//! assert!(parent.blocks().all(|block| block.is_free));
//! ```
//!
//! Several pools can share one backing allocator through a `&RefCell<A>`;
//! a request made while the cell is already borrowed fails with
//! [`InvalidOperation::BackingBusy`].
//!
//! ## Alignment
//!
//! An alignment of `0` means "no requirement". Any other value must be a
//! power of two, or the request fails with [`AllocError::InvalidAlignment`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed capacity**: A pool never grows
//! - **Unix-only**: [`SystemAllocator`] requires `libc` (POSIX systems)
//!
//! ## Logging
//!
//! Allocators report through [`tracing`]: `trace` for every request, `debug`
//! for construction, resets and defragmentation, `warn` for rejected
//! requests. The crate never installs a subscriber.
//!
//! ## Safety
//!
//! Freeing takes raw addresses, so [`Allocator::free`] is `unsafe`: the
//! address must come from the same allocator and must not be used afterwards.

pub mod align;
mod adapter;
mod allocator;
mod bitmap;
mod block;
mod bump;
mod config;
mod error;
mod free_list;
mod pool;
mod size;
mod stack;
mod system;

pub use adapter::{PoolBox, TypedAllocator};
pub use allocator::Allocator;
pub use bitmap::BitmapAllocator;
pub use bump::LinearAllocator;
pub use config::PoolConfig;
pub use error::{AllocError, InvalidOperation};
pub use free_list::{BlockInfo, FreeListAllocator, HEADER_SIZE, MIN_CHUNK_SIZE};
pub use size::{DEFAULT_CHUNK_COUNT, DEFAULT_POOL_SIZE, gibi, kibi, mebi};
pub use stack::StackAllocator;
pub use system::SystemAllocator;
