//! # brkalloc - A First-Fit Allocator on the Program Break
//!
//! This crate provides `malloc`/`free`/`calloc`/`realloc` style primitives
//! implemented directly on top of a heap boundary that can be moved up and
//! down, normally the program break managed by `sbrk(2)`.
//!
//! ## Overview
//!
//! Every allocation grows the heap by a header plus the payload. Released
//! blocks stay where they are and are handed out again, whole, to the first
//! request they can satisfy:
//!
//! ```text
//!   Block List (allocation order == address order):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬──────┬────┬──────┐                              │
//!   │   │ H1 │ used │ H2 │ free │ H3 │ used │                              │
//!   │   └────┴──────┴────┴──────┴────┴──────┘                              │
//!   │     │    ▲      │           ▲         ▲                              │
//!   │     └─next──────┘           │         │                              │
//!   │   head                     tail     Heap                             │
//!   │                                   Boundary                           │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Only the block touching the boundary goes back to the OS on release.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header and header/payload translation (internal)
//!   ├── list       - Allocation-ordered block list (internal)
//!   ├── heap       - HeapGrower trait, Sbrk and ArenaHeap
//!   ├── brk        - BrkAllocator implementation
//!   ├── diag       - Block list dumps
//!   ├── config     - Per-allocator settings
//!   ├── error      - AllocError
//!   ├── global     - Process-wide allocator and GlobalAlloc glue
//!   └── externc    - C entry points (malloc/free/calloc/realloc with `preload`)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{ArenaHeap, BrkAllocator};
//!
//! let allocator = BrkAllocator::new(ArenaHeap::new(4096));
//!
//! let ptr = allocator.allocate(8) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!     allocator.release(ptr as *mut u8);
//! }
//! ```
//!
//! ## How It Works
//!
//! Each block starts with a header:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ state: Used     │  │  │                          │  │
//!   │  │ next: None/ptr  │  │  │  N bytes, rounded to 16  │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │   HEADER_SIZE bytes   │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user (16-byte aligned)
//! ```
//!
//! ## Limitations
//!
//! - **No splitting or coalescing**: a reused block is handed out whole
//! - **One global lock**: every operation is serialized
//! - **16-byte blocks**: `GlobalAlloc` over-allocates for stricter layouts
//! - **No misuse detection**: double frees and foreign pointers are UB
//! - **Unix-only**: [`Sbrk`] requires `libc`
//!
//! ## Safety
//!
//! Releasing and reallocating take raw pointers and are `unsafe`; the pointer
//! must come from the same allocator and still be live.

#[macro_use]
pub mod align;
mod block;
mod brk;
pub mod config;
mod diag;
pub mod error;
pub mod externc;
pub mod global;
pub mod heap;
mod list;

pub use block::{BlockState, HEADER_SIZE};
pub use brk::BrkAllocator;
pub use config::Config;
pub use diag::BlockInfo;
pub use error::AllocError;
pub use global::{GLOBAL, Global};
pub use heap::{ArenaHeap, HeapGrower, Sbrk};
