use std::{marker::PhantomData, ptr::NonNull};

use crate::block::{BlockState, Header};

/// Every live header, linked in allocation order.
///
/// Growth is append-only and blocks are never split, so allocation order is
/// also address order and `tail` is always the block closest to the heap
/// boundary.
pub(crate) struct FreeList {
  head: Option<NonNull<Header>>,
  tail: Option<NonNull<Header>>,
}

// SAFETY: the headers are only reached through the owning allocator's lock.
unsafe impl Send for FreeList {}

impl FreeList {
  pub const fn new() -> Self {
    Self {
      head: None,
      tail: None,
    }
  }

  pub fn head(&self) -> Option<NonNull<Header>> {
    self.head
  }

  pub fn tail(&self) -> Option<NonNull<Header>> {
    self.tail
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// First free block with at least `size` payload bytes.
  pub fn find_free(
    &self,
    size: usize,
  ) -> Option<NonNull<Header>> {
    self.iter().find(|header| {
      // SAFETY: linked headers stay valid until `pop_back` unlinks them.
      let header = unsafe { header.as_ref() };
      header.is_free() && header.size >= size
    })
  }

  /// Links `header` after the current tail.
  ///
  /// # Safety
  ///
  /// `header` must point to an initialized header with `next == None` that
  /// sits above every block already in the list and stays valid until it is
  /// removed with [`FreeList::pop_back`].
  pub unsafe fn push_back(
    &mut self,
    header: NonNull<Header>,
  ) {
    match self.tail {
      Some(mut tail) => unsafe { tail.as_mut().next = Some(header) },
      None => self.head = Some(header),
    }
    self.tail = Some(header);
  }

  /// Unlinks the tail, walking from `head` to find its predecessor.
  pub fn pop_back(&mut self) -> Option<NonNull<Header>> {
    let tail = self.tail?;

    if self.head == self.tail {
      self.head = None;
      self.tail = None;
      return Some(tail);
    }

    let mut current = self.head;
    while let Some(mut header) = current {
      // SAFETY: see `find_free`.
      let header_ref = unsafe { header.as_mut() };
      if header_ref.next == Some(tail) {
        header_ref.next = None;
        self.tail = Some(header);
        break;
      }
      current = header_ref.next;
    }

    Some(tail)
  }

  /// Flips `header` to `state`.
  ///
  /// # Safety
  ///
  /// `header` must be linked in this list.
  pub unsafe fn set_state(
    &mut self,
    mut header: NonNull<Header>,
    state: BlockState,
  ) {
    unsafe { header.as_mut().state = state };
  }

  pub fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head,
      _list: PhantomData,
    }
  }

  pub fn len(&self) -> usize {
    self.iter().count()
  }
}

pub(crate) struct Iter<'a> {
  current: Option<NonNull<Header>>,
  _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
  type Item = NonNull<Header>;

  fn next(&mut self) -> Option<Self::Item> {
    let header = self.current?;
    // SAFETY: see `FreeList::find_free`.
    self.current = unsafe { header.as_ref().next };
    Some(header)
  }
}
