use std::{mem, ptr::NonNull};

use crate::align::{MIN_ALIGN, checked_align};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
  Used,
  Free,
}

/// Metadata stored right before every payload. The alignment of the header
/// is what keeps payloads on a [`MIN_ALIGN`] boundary.
#[repr(C, align(16))]
pub struct Header {
  /// Requested payload size, not rounded.
  pub size: usize,
  pub state: BlockState,
  /// Next header in allocation order.
  pub next: Option<NonNull<Header>>,
}

pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const _: () = assert!(mem::align_of::<Header>() == MIN_ALIGN);
const _: () = assert!(HEADER_SIZE % MIN_ALIGN == 0);

impl Header {
  pub const fn new(size: usize) -> Self {
    Self {
      size,
      state: BlockState::Used,
      next: None,
    }
  }

  pub fn is_free(&self) -> bool {
    self.state == BlockState::Free
  }

  /// Bytes this block occupies on the heap, header included.
  pub fn span(&self) -> usize {
    // Cannot overflow: the same value was computed when the block was grown.
    HEADER_SIZE + align!(self.size)
  }
}

/// Bytes to request from the heap for a payload of `size` bytes, or `None` if
/// that does not fit in an `isize` delta.
pub fn span_for(size: usize) -> Option<usize> {
  let span = checked_align(size)?.checked_add(HEADER_SIZE)?;
  isize::try_from(span).ok()?;
  Some(span)
}

// The two functions below are the only places where header and payload
// addresses are translated into each other.

/// Payload address for `header`.
///
/// # Safety
///
/// `header` must point to a header written by the allocator, followed by its
/// payload.
pub unsafe fn payload_of(header: NonNull<Header>) -> NonNull<u8> {
  unsafe { header.cast::<u8>().add(HEADER_SIZE) }
}

/// Header address for a payload previously returned by [`payload_of`].
///
/// # Safety
///
/// `payload` must have been produced by [`payload_of`] and its block must not
/// have been returned to the heap.
pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<Header> {
  unsafe { payload.sub(HEADER_SIZE).cast() }
}

/// One past the last payload byte of `header`'s block, rounding included.
///
/// # Safety
///
/// Same as [`payload_of`].
pub unsafe fn block_end(header: NonNull<Header>) -> NonNull<u8> {
  unsafe {
    let span = header.as_ref().span();
    header.cast::<u8>().add(span)
  }
}
