//! The process-wide allocator and the [`GlobalAlloc`] glue.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: brkalloc::Global = brkalloc::Global;
//! ```

use std::{
  alloc::{GlobalAlloc, Layout},
  io, mem,
  ptr::{self, NonNull},
};

use crate::{
  align::MIN_ALIGN,
  brk::BrkAllocator,
  config::Config,
  heap::{HeapGrower, Sbrk},
};

/// The allocator behind the free functions of this module and [`Global`].
///
/// Nothing is touched until the first growth, so building it is free. Logging
/// is off: it may be serving the very allocations a logger makes.
// SAFETY: this is the only `Sbrk` the crate creates.
pub static GLOBAL: BrkAllocator<Sbrk> =
  BrkAllocator::with_config(unsafe { Sbrk::new() }, Config::DEFAULT.with_label("global"));

pub fn allocate(size: usize) -> *mut u8 {
  GLOBAL.allocate(size)
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn release(ptr: *mut u8) {
  unsafe { GLOBAL.release(ptr) }
}

pub fn zero_allocate(
  count: usize,
  size: usize,
) -> *mut u8 {
  GLOBAL.zero_allocate(count, size)
}

/// # Safety
///
/// Same as [`release`].
pub unsafe fn reallocate(
  ptr: *mut u8,
  size: usize,
) -> *mut u8 {
  unsafe { GLOBAL.reallocate(ptr, size) }
}

/// Writes the global block list to standard error.
pub fn dump() -> io::Result<()> {
  GLOBAL.dump_stderr()
}

/// Zero-sized handle to [`GLOBAL`], for `#[global_allocator]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

unsafe impl GlobalAlloc for Global {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    unsafe { GLOBAL.alloc(layout) }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    unsafe { GLOBAL.dealloc(ptr, layout) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    unsafe { GLOBAL.alloc_zeroed(layout) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { GLOBAL.realloc(ptr, layout, new_size) }
  }
}

/// Layouts up to [`MIN_ALIGN`] map straight onto blocks. Stricter ones get a
/// block `align` bytes larger, the payload is rounded up inside it, and the
/// block's own payload pointer is kept in the word just below.
unsafe impl<H: HeapGrower> GlobalAlloc for BrkAllocator<H> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > MIN_ALIGN {
      return self.alloc_over_aligned(layout, false);
    }
    self
      .try_allocate_layout(layout)
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
  ) {
    // SAFETY: `GlobalAlloc` requires `ptr` to come from `alloc` above with
    // the same layout.
    unsafe { self.release(block_payload(ptr, layout)) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > MIN_ALIGN {
      return self.alloc_over_aligned(layout, true);
    }
    self.zero_allocate(1, layout.size())
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() <= MIN_ALIGN {
      return unsafe { self.reallocate(ptr, new_size) };
    }

    // SAFETY: `GlobalAlloc` guarantees `new_size` rounded to `align` fits.
    let new_layout =
      unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
    let data = self.alloc_over_aligned(new_layout, false);
    if data.is_null() {
      return data;
    }

    // SAFETY: both regions are live, distinct and at least this long.
    unsafe {
      ptr::copy_nonoverlapping(ptr, data, layout.size().min(new_size));
      self.dealloc(ptr, layout);
    }
    data
  }
}

impl<H: HeapGrower> BrkAllocator<H> {
  fn alloc_over_aligned(
    &self,
    layout: Layout,
    zeroed: bool,
  ) -> *mut u8 {
    let Some(padded) = layout.size().checked_add(layout.align()) else {
      return ptr::null_mut();
    };
    let raw = if zeroed {
      self.zero_allocate(1, padded)
    } else {
      self.allocate(padded)
    };
    if raw.is_null() {
      return raw;
    }

    // `raw` is 16-aligned and `align` is a larger power of two, so rounding
    // past one word lands at most `align` bytes in and leaves `size` bytes.
    let base = raw as usize;
    let offset = align_to!(base + mem::size_of::<usize>(), layout.align()) - base;
    // SAFETY: `offset <= align`, inside the `size + align` bytes just handed
    // out, and the word below the aligned address is past `raw`.
    unsafe {
      let aligned = raw.add(offset);
      aligned.cast::<*mut u8>().sub(1).write(raw);
      aligned
    }
  }
}

/// The pointer the block list knows about for a `GlobalAlloc` pointer.
///
/// # Safety
///
/// `ptr` must be null or come from `alloc`/`alloc_zeroed` with `layout`.
unsafe fn block_payload(
  ptr: *mut u8,
  layout: Layout,
) -> *mut u8 {
  if ptr.is_null() || layout.align() <= MIN_ALIGN {
    return ptr;
  }
  unsafe { ptr.cast::<*mut u8>().sub(1).read() }
}
