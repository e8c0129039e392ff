use std::{
  fmt,
  io::{self, Write},
  ptr::{self, NonNull},
};

use crate::{
  block::{BlockState, Header},
  brk::BrkAllocator,
  heap::HeapGrower,
};

/// Copy of one header, as seen at the time it was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header itself.
  pub address: usize,
  pub size: usize,
  pub state: BlockState,
  /// Address of the next header, or 0 for the tail.
  pub next: usize,
}

impl BlockInfo {
  /// # Safety
  ///
  /// `header` must be linked in an allocator's list, and that allocator's
  /// lock must be held.
  pub(crate) unsafe fn read(header: NonNull<Header>) -> Self {
    let header_ref = unsafe { header.as_ref() };
    Self {
      address: header.as_ptr() as usize,
      size: header_ref.size,
      state: header_ref.state,
      next: header_ref.next.map_or(0, |next| next.as_ptr() as usize),
    }
  }

  pub fn is_free(&self) -> bool {
    self.state == BlockState::Free
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "addr = {:#x}, size = {}, is_free = {}, next = {:#x}",
      self.address,
      self.size,
      self.is_free() as u8,
      self.next
    )
  }
}

fn address(header: Option<NonNull<Header>>) -> *const Header {
  header.map_or(ptr::null(), |header| header.as_ptr())
}

impl<H: HeapGrower> BrkAllocator<H> {
  /// Writes `head`/`tail` and then one line per block, in list order.
  ///
  /// The lock is held while writing, so `out` must not allocate from this
  /// allocator.
  pub fn dump<W: Write>(
    &self,
    out: &mut W,
  ) -> io::Result<()> {
    let state = self.lock();

    writeln!(
      out,
      "head = {:?}, tail = {:?}",
      address(state.list.head()),
      address(state.list.tail())
    )?;

    for header in state.list.iter() {
      // SAFETY: linked and locked.
      writeln!(out, "{}", unsafe { BlockInfo::read(header) })?;
    }

    Ok(())
  }

  /// [`BrkAllocator::dump`] to standard error.
  pub fn dump_stderr(&self) -> io::Result<()> {
    self.dump(&mut io::stderr().lock())
  }

  /// Every block, in list order.
  ///
  /// The buffer is allocated before the lock is taken; blocks linked in
  /// between are left out.
  pub fn snapshot(&self) -> Vec<BlockInfo> {
    let mut blocks = Vec::with_capacity(self.block_count());

    let state = self.lock();
    for header in state.list.iter().take(blocks.capacity()) {
      // SAFETY: linked and locked.
      blocks.push(unsafe { BlockInfo::read(header) });
    }

    blocks
  }

  /// Prints one allocation together with the current heap boundary.
  pub fn print_alloc(
    &self,
    size: usize,
    addr: *mut u8,
  ) {
    println!(
      "Allocated {} bytes, address = {:?}, heap boundary = {:?}",
      size,
      addr,
      self.heap_boundary()
    );
  }
}
