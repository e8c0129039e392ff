use std::{
  alloc::Layout,
  ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{
  align::MIN_ALIGN,
  block::{self, BlockState, Header},
  config::Config,
  error::AllocError,
  heap::HeapGrower,
  list::FreeList,
};

/// Logs through `log` when the allocator's config allows it, prefixed with
/// the allocator's label.
macro_rules! event {
  ($allocator:expr, $level:ident, $($arg:tt)*) => {
    if $allocator.config.log_events {
      log::$level!("[{}] {}", $allocator.config.label, format_args!($($arg)*));
    }
  };
}

pub(crate) struct State<H> {
  pub(crate) list: FreeList,
  pub(crate) heap: H,
}

/// First-fit allocator over a [`HeapGrower`].
///
/// Every block is a [`Header`] followed by its payload. Freed blocks stay in
/// the list and are handed out whole to the first request they fit; only the
/// block touching the heap boundary is given back to the heap when released.
/// One lock guards the list and every call into the heap.
pub struct BrkAllocator<H: HeapGrower> {
  state: Mutex<State<H>>,
  config: Config,
}

impl<H: HeapGrower> BrkAllocator<H> {
  /// An allocator with [`Config::DEFAULT`], which does not log. Use
  /// [`BrkAllocator::with_config`] and [`Config::VERBOSE`] to trace events.
  pub const fn new(heap: H) -> Self {
    Self::with_config(heap, Config::DEFAULT)
  }

  pub const fn with_config(
    heap: H,
    config: Config,
  ) -> Self {
    Self {
      state: Mutex::new(State {
        list: FreeList::new(),
        heap,
      }),
      config,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub(crate) fn lock(&self) -> MutexGuard<'_, State<H>> {
    self.state.lock()
  }

  /// Allocates `size` bytes, returning null on failure or when `size` is 0.
  pub fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    self
      .try_allocate(size)
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  /// Like [`BrkAllocator::allocate`], but says why it failed.
  pub fn try_allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let span = block::span_for(size).ok_or(AllocError::OutOfMemory { requested: size })?;

    let mut state = self.lock();

    if let Some(header) = state.list.find_free(size) {
      // SAFETY: `find_free` only returns linked headers.
      unsafe { state.list.set_state(header, BlockState::Used) };
      event!(self, trace, "reuse {:?} for {} bytes", header, size);
      // SAFETY: linked headers are followed by their payload.
      return Ok(unsafe { block::payload_of(header) });
    }

    // `span_for` keeps the span within `isize`.
    let Some(base) = state.heap.grow(span as isize) else {
      event!(self, debug, "heap refused to grow by {} bytes", span);
      return Err(AllocError::OutOfMemory { requested: size });
    };

    let header = base.cast::<Header>();
    // SAFETY: the grower handed us `span` fresh, aligned bytes above every
    // existing block.
    unsafe {
      header.as_ptr().write(Header::new(size));
      state.list.push_back(header);
    }
    event!(self, debug, "grew heap by {} bytes for {:?}", span, header);

    // SAFETY: the header was just written and the payload follows it.
    Ok(unsafe { block::payload_of(header) })
  }

  /// Allocation for a [`Layout`]. Alignments above [`MIN_ALIGN`] are refused
  /// here; the `GlobalAlloc` impl over-allocates for them instead.
  pub fn try_allocate_layout(
    &self,
    layout: Layout,
  ) -> Result<NonNull<u8>, AllocError> {
    if layout.align() > MIN_ALIGN {
      return Err(AllocError::UnsupportedAlignment {
        align: layout.align(),
      });
    }
    self.try_allocate(layout.size())
  }

  /// Gives `ptr` back. The block returns to the heap if it is the topmost
  /// one, otherwise it is only marked free.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn release(
    &self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };
    // SAFETY: caller guarantees the pointer came from us.
    let header = unsafe { block::header_of(payload) };

    let mut state = self.lock();
    let State { list, heap } = &mut *state;

    let boundary = heap.boundary();
    // SAFETY: the block is live, so its header is intact.
    let end = unsafe { block::block_end(header) };

    if boundary != Some(end) {
      // SAFETY: live blocks are linked.
      unsafe { list.set_state(header, BlockState::Free) };
      event!(self, trace, "marked {:?} free", header);
      return;
    }

    debug_assert_eq!(list.tail(), Some(header));
    // SAFETY: still linked, the header is read before the memory goes away.
    let span = unsafe { header.as_ref().span() };
    list.pop_back();

    if heap.grow(-(span as isize)).is_none() {
      event!(self, warn, "heap refused to shrink by {} bytes", span);
      return;
    }
    event!(self, debug, "shrank heap by {} bytes", span);
  }

  /// Allocates `count * size` zeroed bytes. Null if the product overflows,
  /// is zero, or does not fit.
  pub fn zero_allocate(
    &self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    self
      .try_zero_allocate(count, size)
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  pub fn try_zero_allocate(
    &self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::Overflow { count, size })?;

    let data = self.try_allocate(total)?;
    // SAFETY: we own the `total` bytes just handed out. Reused blocks may be
    // larger, but only `total` bytes are promised to the caller.
    unsafe { data.as_ptr().write_bytes(0, total) };

    Ok(data)
  }

  /// Resizes the block at `ptr` to at least `size` bytes.
  ///
  /// - null `ptr` behaves like [`BrkAllocator::allocate`];
  /// - `size == 0` releases `ptr` and returns null;
  /// - a block that is already big enough is returned as is;
  /// - otherwise the contents move to a new block. If that allocation fails,
  ///   null is returned and `ptr` stays allocated.
  ///
  /// # Safety
  ///
  /// Same as [`BrkAllocator::release`].
  pub unsafe fn reallocate(
    &self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    let Some(payload) = NonNull::new(ptr) else {
      return self.allocate(size);
    };

    if size == 0 {
      unsafe { self.release(ptr) };
      return ptr::null_mut();
    }

    // The caller owns the block, so its size cannot change under us.
    let old_size = unsafe { block::header_of(payload).as_ref().size };
    if old_size >= size {
      return ptr;
    }

    let Ok(data) = self.try_allocate(size) else {
      return ptr::null_mut();
    };

    // SAFETY: both blocks are live, distinct and at least `old_size` long.
    unsafe {
      ptr::copy_nonoverlapping(payload.as_ptr(), data.as_ptr(), old_size);
      self.release(ptr);
    }

    data.as_ptr()
  }

  /// Current heap boundary, queried under the lock.
  pub fn heap_boundary(&self) -> Option<NonNull<u8>> {
    self.lock().heap.boundary()
  }

  /// Number of blocks in the list, free or used.
  pub fn block_count(&self) -> usize {
    self.lock().list.len()
  }

  /// Runs `f` on the heap while holding the lock.
  pub fn with_heap<R>(
    &self,
    f: impl FnOnce(&H) -> R,
  ) -> R {
    f(&self.lock().heap)
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::{block::HEADER_SIZE, diag::BlockInfo, heap::ArenaHeap};

  fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
  }

  fn arena(capacity: usize) -> BrkAllocator<ArenaHeap> {
    init_logging();
    let config = Config::VERBOSE.with_label("test");
    BrkAllocator::with_config(ArenaHeap::new(capacity), config)
  }

  fn growths(allocator: &BrkAllocator<ArenaHeap>) -> usize {
    allocator.with_heap(ArenaHeap::growths)
  }

  #[test]
  fn test_blocks_are_laid_out_back_to_back() {
    let allocator = arena(4096);

    let word = allocator.allocate(8).cast::<u64>();
    let halves = allocator.allocate(12).cast::<u16>();
    let wide = allocator.allocate(17);

    // Each block starts where the previous one's rounded payload ends.
    assert_eq!(halves as usize - word as usize, HEADER_SIZE + 16);
    assert_eq!(wide as usize - halves as usize, HEADER_SIZE + 16);

    unsafe {
      word.write(u64::MAX);
      for i in 0..6 {
        halves.add(i).write(i as u16 + 1);
      }
      wide.write_bytes(0x5A, 17);

      assert_eq!(word.read(), u64::MAX);
      assert_eq!(std::slice::from_raw_parts(halves, 6), [1, 2, 3, 4, 5, 6]);
      assert!(std::slice::from_raw_parts(wide, 17).iter().all(|&b| b == 0x5A));
    }

    let sizes: Vec<usize> = allocator.snapshot().iter().map(|b| b.size).collect();
    assert_eq!(sizes, [8, 12, 17]);
    assert_eq!(growths(&allocator), 3);
    assert_eq!(
      allocator.with_heap(ArenaHeap::used),
      3 * HEADER_SIZE + 16 + 16 + 32
    );
  }

  #[test]
  fn test_zero_size_is_null_without_growth() {
    let allocator = arena(256);
    let before = allocator.heap_boundary();

    assert!(allocator.allocate(0).is_null());
    assert_eq!(allocator.try_allocate(0), Err(AllocError::ZeroSize));
    assert_eq!(allocator.heap_boundary(), before);
    assert_eq!(growths(&allocator), 0);
    assert_eq!(allocator.block_count(), 0);
  }

  #[test]
  fn test_payloads_are_aligned() {
    let allocator = arena(4096);

    for size in [1, 3, 7, 16, 17, 33, 100] {
      let ptr = allocator.allocate(size);
      assert!(!ptr.is_null());
      assert_eq!(ptr as usize % 16, 0, "size {size}");
    }
  }

  #[test]
  fn test_reuse_then_topmost_release() {
    let allocator = arena(4096);
    let base = allocator.heap_boundary().unwrap().as_ptr() as usize;

    let p1 = allocator.allocate(64);
    let p2 = allocator.allocate(32);
    assert_ne!(p1, p2);
    assert_eq!(growths(&allocator), 2);

    unsafe { allocator.release(p1) };
    assert_eq!(allocator.block_count(), 2);
    assert!(allocator.snapshot()[0].is_free());

    let p3 = allocator.allocate(16);
    assert_eq!(p3, p1);
    assert_eq!(growths(&allocator), 2);
    assert!(!allocator.snapshot()[0].is_free());
    // Handed out whole, the header keeps the original size.
    assert_eq!(allocator.snapshot()[0].size, 64);

    unsafe { allocator.release(p2) };
    assert_eq!(allocator.block_count(), 1);
    assert_eq!(
      allocator.heap_boundary().unwrap().as_ptr() as usize,
      base + HEADER_SIZE + 64
    );
    assert_eq!(allocator.snapshot()[0].next, 0);
  }

  #[test]
  fn test_release_most_recent_comes_back_at_same_address() {
    let allocator = arena(4096);
    allocator.allocate(48);

    let p = allocator.allocate(40);
    unsafe { allocator.release(p) };
    assert_eq!(allocator.block_count(), 1);

    let q = allocator.allocate(40);
    assert_eq!(q, p);
    assert_eq!(allocator.block_count(), 2);
  }

  #[test]
  fn test_release_sole_block_restores_boundary() {
    let allocator = arena(1024);
    let before = allocator.heap_boundary();

    let p = allocator.allocate(100);
    assert_ne!(allocator.heap_boundary(), before);

    unsafe { allocator.release(p) };

    assert_eq!(allocator.heap_boundary(), before);
    assert_eq!(allocator.block_count(), 0);
    assert!(allocator.lock().list.is_empty());
    assert_eq!(allocator.lock().list.tail(), None);
  }

  #[test]
  fn test_release_non_topmost_only_flips_flag() {
    let allocator = arena(1024);
    let p1 = allocator.allocate(10);
    let p2 = allocator.allocate(10);
    let p3 = allocator.allocate(10);
    let boundary = allocator.heap_boundary();

    unsafe { allocator.release(p2) };

    assert_eq!(allocator.heap_boundary(), boundary);
    let blocks = allocator.snapshot();
    assert_eq!(blocks.len(), 3);
    assert_eq!(
      blocks.iter().map(BlockInfo::is_free).collect::<Vec<_>>(),
      [false, true, false]
    );

    unsafe {
      allocator.release(p1);
      allocator.release(p3);
    }
  }

  #[test]
  fn test_topmost_release_does_not_merge_free_neighbours() {
    let allocator = arena(1024);
    let p1 = allocator.allocate(10);
    let p2 = allocator.allocate(10);

    unsafe {
      allocator.release(p1);
      allocator.release(p2);
    }

    // Only the topmost block goes back; the free one below it stays listed.
    assert_eq!(allocator.block_count(), 1);
    assert!(allocator.snapshot()[0].is_free());
  }

  #[test]
  fn test_release_null_is_noop() {
    let allocator = arena(256);
    allocator.allocate(8);

    unsafe { allocator.release(ptr::null_mut()) };

    assert_eq!(allocator.block_count(), 1);
  }

  #[test]
  fn test_out_of_memory_keeps_list_consistent() {
    let allocator = arena(HEADER_SIZE + 64);
    let p = allocator.allocate(64);
    assert!(!p.is_null());
    let boundary = allocator.heap_boundary();

    assert!(allocator.allocate(1).is_null());
    assert_eq!(
      allocator.try_allocate(1),
      Err(AllocError::OutOfMemory { requested: 1 })
    );
    assert_eq!(allocator.block_count(), 1);
    assert_eq!(allocator.heap_boundary(), boundary);

    assert_eq!(
      allocator.try_allocate(usize::MAX),
      Err(AllocError::OutOfMemory { requested: usize::MAX })
    );
  }

  #[test]
  fn test_zero_allocate_overflow() {
    let allocator = arena(256);

    assert!(allocator.zero_allocate(4, usize::MAX).is_null());
    assert_eq!(
      allocator.try_zero_allocate(4, usize::MAX),
      Err(AllocError::Overflow {
        count: 4,
        size: usize::MAX
      })
    );
    assert_eq!(growths(&allocator), 0);
    assert!(allocator.zero_allocate(0, 8).is_null());
  }

  #[test]
  fn test_zero_allocate_clears_reused_block() {
    let allocator = arena(1024);
    let dirty = allocator.allocate(64);
    let _guard = allocator.allocate(8);

    unsafe {
      dirty.write_bytes(0xAB, 64);
      allocator.release(dirty);
    }

    let zeroed = allocator.zero_allocate(8, 8);
    assert_eq!(zeroed, dirty);

    let bytes = unsafe { std::slice::from_raw_parts(zeroed, 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_reallocate_null_allocates() {
    let allocator = arena(1024);

    let p = unsafe { allocator.reallocate(ptr::null_mut(), 24) };

    assert!(!p.is_null());
    assert_eq!(allocator.block_count(), 1);
    assert_eq!(allocator.snapshot()[0].size, 24);
    assert!(unsafe { allocator.reallocate(ptr::null_mut(), 0) }.is_null());
  }

  #[test]
  fn test_reallocate_to_zero_releases() {
    let allocator = arena(1024);
    let before = allocator.heap_boundary();
    let p = allocator.allocate(24);

    let q = unsafe { allocator.reallocate(p, 0) };

    assert!(q.is_null());
    assert_eq!(allocator.block_count(), 0);
    assert_eq!(allocator.heap_boundary(), before);
  }

  #[test]
  fn test_reallocate_smaller_keeps_pointer() {
    let allocator = arena(1024);
    let p = allocator.allocate(10);
    unsafe { p.copy_from(b"0123456789".as_ptr(), 10) };
    let boundary = allocator.heap_boundary();

    let q = unsafe { allocator.reallocate(p, 5) };

    assert_eq!(q, p);
    assert_eq!(allocator.heap_boundary(), boundary);
    assert_eq!(allocator.snapshot()[0].size, 10);
    assert_eq!(unsafe { std::slice::from_raw_parts(q, 10) }, b"0123456789");
  }

  #[test]
  fn test_reallocate_larger_moves_contents() {
    let allocator = arena(1024);
    let p = allocator.allocate(10);
    unsafe { p.copy_from(b"abcdefghij".as_ptr(), 10) };

    let q = unsafe { allocator.reallocate(p, 100) };

    assert!(!q.is_null());
    assert_ne!(q, p);
    assert_eq!(unsafe { std::slice::from_raw_parts(q, 10) }, b"abcdefghij");

    let blocks = allocator.snapshot();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].is_free());
    assert_eq!(blocks[1].size, 100);
  }

  #[test]
  fn test_reallocate_failure_keeps_original() {
    let allocator = arena(HEADER_SIZE + 16);
    let p = allocator.allocate(16);
    unsafe { p.write_bytes(7, 16) };

    let q = unsafe { allocator.reallocate(p, 64) };

    assert!(q.is_null());
    let blocks = allocator.snapshot();
    assert_eq!(blocks.len(), 1);
    assert!(!blocks[0].is_free());
    assert!(unsafe { std::slice::from_raw_parts(p, 16) }.iter().all(|&b| b == 7));
  }

  #[test]
  fn test_concurrent_pairs_leave_acyclic_list() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let allocator = arena(1 << 20);

    thread::scope(|scope| {
      for t in 0..THREADS {
        let allocator = &allocator;
        scope.spawn(move || {
          for round in 0..ROUNDS {
            let size = 1 + (t * 31 + round * 7) % 200;
            let ptr = allocator.allocate(size);
            assert!(!ptr.is_null());
            unsafe {
              ptr.write_bytes(t as u8, size);
              assert!(std::slice::from_raw_parts(ptr, size).iter().all(|&b| b == t as u8));
              allocator.release(ptr);
            }
          }
        });
      }
    });

    let blocks = allocator.snapshot();
    assert_eq!(blocks.len(), allocator.block_count());
    assert!(blocks.iter().all(BlockInfo::is_free));
    for pair in blocks.windows(2) {
      assert_eq!(pair[0].next, pair[1].address);
      assert!(pair[0].address < pair[1].address);
    }

    let mut out = Vec::new();
    allocator.dump(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), blocks.len() + 1);
  }

  #[test]
  fn test_new_does_not_log() {
    let allocator = BrkAllocator::new(ArenaHeap::new(64));
    assert_eq!(*allocator.config(), Config::DEFAULT);
    assert!(!allocator.config().log_events);
    assert!(!allocator.allocate(8).is_null());

    let config = Config::VERBOSE.with_label("verbose");
    let allocator = BrkAllocator::with_config(ArenaHeap::new(64), config);
    assert!(allocator.config().log_events);
    assert_eq!(allocator.config().label, "verbose");
  }
}
