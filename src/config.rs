/// Per-allocator settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
  /// Emit `log` records for growth, shrink and reuse. Must stay off for an
  /// allocator that serves as the global allocator while the installed logger
  /// allocates, otherwise every record re-enters the allocator.
  pub log_events: bool,
  /// Prefix for log records, to tell several allocators apart.
  pub label: &'static str,
}

impl Config {
  /// No logging.
  pub const DEFAULT: Self = Self {
    log_events: false,
    label: "brk",
  };

  /// Logs every growth, shrink and reuse. Records are formatted while the
  /// allocator's lock is held.
  pub const VERBOSE: Self = Self {
    log_events: true,
    ..Self::DEFAULT
  };

  pub const fn with_label(
    self,
    label: &'static str,
  ) -> Self {
    Self { label, ..self }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::DEFAULT
  }
}
