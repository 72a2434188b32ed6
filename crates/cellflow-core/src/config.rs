#![forbid(unsafe_code)]

//! Notification configuration.

/// Default limit on nested fan-outs of a single observable.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Controls how an observable fans out notifications.
///
/// Derived values and mapped arrays inherit the configuration of the
/// observable they were built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Maximum number of nested fan-outs of one observable. A write issued
    /// from inside an observer that would exceed it is rejected with
    /// [`CellError::ReentrancyLimit`](crate::CellError::ReentrancyLimit).
    pub max_depth: usize,
    /// Catch observer panics and keep delivering to the remaining observers.
    /// When disabled the panic unwinds into the writer.
    pub catch_panics: bool,
}

impl NotifyConfig {
    /// Set the nested fan-out limit. Clamped to at least 1.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Set whether observer panics are caught.
    #[must_use]
    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            catch_panics: true,
        }
    }
}
