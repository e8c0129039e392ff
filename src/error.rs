use thiserror::Error;

use crate::align::MIN_ALIGN;

/// Why an allocation returned null.
///
/// The classic entry points only report failure as a null pointer; the
/// `try_*` variants return this instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("zero-size allocation request")]
  ZeroSize,
  #[error("heap could not grow to fit {requested} bytes")]
  OutOfMemory { requested: usize },
  #[error("{count} * {size} overflows usize")]
  Overflow { count: usize, size: usize },
  #[error("alignment {align} is above the {min}-byte minimum", min = MIN_ALIGN)]
  UnsupportedAlignment { align: usize },
}
