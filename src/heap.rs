use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::align::MIN_ALIGN;

/// Something that owns a heap boundary which can be moved up and down.
///
/// `grow(delta)` moves the boundary by `delta` bytes and returns the boundary
/// as it was before the call, or `None` if the move is impossible. A `delta`
/// of zero is a pure query.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// - after a successful positive `grow(delta)`, the `delta` bytes starting at
///   the returned address are writable and belong to the caller until the
///   boundary is moved back below them;
/// - consecutive positive growths are contiguous, so the address returned by
///   one is the address that a following query reports minus `delta`;
/// - every address returned by a positive grow is aligned to [`MIN_ALIGN`].
pub unsafe trait HeapGrower {
  fn grow(
    &mut self,
    delta: isize,
  ) -> Option<NonNull<u8>>;

  /// Current boundary.
  fn boundary(&mut self) -> Option<NonNull<u8>> {
    self.grow(0)
  }
}

/// The process heap, moved with `sbrk(2)`.
#[derive(Debug)]
pub struct Sbrk(());

impl Sbrk {
  /// # Safety
  ///
  /// Nothing else may shrink the program break below memory handed out
  /// through this value, and no other allocator may assume it owns the
  /// memory between the break and the blocks this value grew. In practice
  /// that means one `Sbrk` per process, used by the global allocator.
  pub const unsafe fn new() -> Self {
    Self(())
  }

  /// Pads the break up to [`MIN_ALIGN`] if something left it misaligned.
  fn align_break(&mut self) -> Option<()> {
    let current = unsafe { sbrk(0) } as usize;
    let padding = align!(current) - current;

    if padding != 0 && unsafe { sbrk(padding as intptr_t) } == usize::MAX as *mut c_void {
      return None;
    }

    Some(())
  }
}

unsafe impl HeapGrower for Sbrk {
  fn grow(
    &mut self,
    delta: isize,
  ) -> Option<NonNull<u8>> {
    if delta > 0 {
      self.align_break()?;
    }

    // SAFETY: the constructor's contract makes this value the sole owner of
    // the break.
    let previous = unsafe { sbrk(delta as intptr_t) };

    if previous == usize::MAX as *mut c_void {
      return None;
    }

    NonNull::new(previous.cast())
  }
}

/// A fixed-capacity region with its own boundary, carved out of the system
/// allocator. Lets several allocators live side by side in one process.
pub struct ArenaHeap {
  base: NonNull<u8>,
  capacity: usize,
  top: usize,
  growths: usize,
}

// SAFETY: the region is owned exclusively by this value.
unsafe impl Send for ArenaHeap {}

impl ArenaHeap {
  pub fn new(capacity: usize) -> Self {
    let layout = Self::layout(capacity);
    // SAFETY: the layout is never zero-sized.
    let base = unsafe { alloc::alloc(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      capacity,
      top: 0,
      growths: 0,
    }
  }

  fn layout(capacity: usize) -> Layout {
    match Layout::from_size_align(capacity.max(MIN_ALIGN), MIN_ALIGN) {
      Ok(layout) => layout,
      Err(_) => panic!("arena capacity {capacity} is too large"),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes between the base and the boundary.
  pub fn used(&self) -> usize {
    self.top
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Number of successful positive moves of the boundary.
  pub fn growths(&self) -> usize {
    self.growths
  }
}

unsafe impl HeapGrower for ArenaHeap {
  fn grow(
    &mut self,
    delta: isize,
  ) -> Option<NonNull<u8>> {
    let previous = self.top;
    let top = previous.checked_add_signed(delta)?;

    if top > self.capacity {
      return None;
    }

    if delta > 0 {
      self.growths += 1;
    }
    self.top = top;

    // SAFETY: `previous <= capacity`, so this stays within the region or one
    // past its end.
    Some(unsafe { self.base.add(previous) })
  }
}

impl Drop for ArenaHeap {
  fn drop(&mut self) {
    // SAFETY: allocated in `new` with the same layout.
    unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) }
  }
}
