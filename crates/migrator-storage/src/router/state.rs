//! The router's single piece of mutable state.

use std::sync::Mutex;

use migrator_core::Pattern;

/// Active double-write pattern, shared by reference between the router and
/// whoever drives pattern changes.
#[derive(Debug, Default)]
pub struct RouterState {
    pattern: Mutex<Pattern>,
}

impl RouterState {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern: Mutex::new(pattern),
        }
    }

    pub fn load(&self) -> Pattern {
        *self.pattern.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap in `pattern`, returning the previous one.
    pub fn store(&self, pattern: Pattern) -> Pattern {
        let mut guard = self.pattern.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, pattern)
    }
}
