/// Alignment guaranteed for every payload handed out by the allocator.
pub const MIN_ALIGN: usize = 16;

/// Rounds `value` up to the next multiple of `align`, which must be a power of
/// two.
///
/// # Examples
///
/// ```rust
/// use brkalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to the payload alignment ([`MIN_ALIGN`]).
///
/// # Examples
///
/// ```rust
/// use brkalloc::align;
///
/// assert_eq!(align!(1), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::MIN_ALIGN)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping around.
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(MIN_ALIGN - 1) {
    Some(padded) => Some(padded & !(MIN_ALIGN - 1)),
    None => None,
  }
}
