//! C entry points over [`GLOBAL`].
//!
//! The `brk_*` functions are always exported. With the `preload` feature the
//! `cdylib` also exports `malloc`, `free`, `calloc` and `realloc`, so it can
//! stand in for the C library's allocator:
//!
//! ```text
//! cargo build --release --features preload
//! LD_PRELOAD=target/release/libbrkalloc.so ls
//! ```
//!
//! `posix_memalign`, `aligned_alloc` and `memalign` are not replaced; memory
//! from those must not reach `free` here.

use libc::{c_int, c_void, size_t};

use crate::global::GLOBAL;

#[unsafe(no_mangle)]
pub extern "C" fn brk_malloc(size: size_t) -> *mut c_void {
  GLOBAL.allocate(size).cast()
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by these functions.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brk_free(ptr: *mut c_void) {
  unsafe { GLOBAL.release(ptr.cast()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn brk_calloc(
  count: size_t,
  size: size_t,
) -> *mut c_void {
  GLOBAL.zero_allocate(count, size).cast()
}

/// # Safety
///
/// Same as [`brk_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn brk_realloc(
  ptr: *mut c_void,
  size: size_t,
) -> *mut c_void {
  unsafe { GLOBAL.reallocate(ptr.cast(), size).cast() }
}

/// Writes the block list to standard error. Returns 0, or -1 if the write
/// failed.
#[unsafe(no_mangle)]
pub extern "C" fn print_mem_list() -> c_int {
  match GLOBAL.dump_stderr() {
    Ok(()) => 0,
    Err(_) => -1,
  }
}

#[cfg(feature = "preload")]
mod preload {
  use libc::{c_void, size_t};

  #[unsafe(no_mangle)]
  pub extern "C" fn malloc(size: size_t) -> *mut c_void {
    super::brk_malloc(size)
  }

  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { super::brk_free(ptr) }
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn calloc(
    count: size_t,
    size: size_t,
  ) -> *mut c_void {
    super::brk_calloc(count, size)
  }

  #[unsafe(no_mangle)]
  pub unsafe extern "C" fn realloc(
    ptr: *mut c_void,
    size: size_t,
  ) -> *mut c_void {
    unsafe { super::brk_realloc(ptr, size) }
  }
}
