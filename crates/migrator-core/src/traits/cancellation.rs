//! Cooperative cancellation token.
//!
//! Long-running loops poll `is_cancelled()` at page boundaries and use
//! `sleep()` for back-off so a cancel wakes them immediately. Child tokens
//! are cancelled with their parent but can also be cancelled on their own.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        if *self.cancelled.lock().unwrap_or_else(|e| e.into_inner()) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    fn effective_deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.effective_deadline());
        match (self.deadline, inherited) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn cancel(&self) {
        {
            let mut flag = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
            if *flag {
                return;
            }
            *flag = true;
            self.wake.notify_all();
        }
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(|e| e.into_inner()));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cloneable handle; all clones share one cancellation state.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled when `self` is, or when cancelled directly.
    pub fn child_token(&self) -> Self {
        self.child(None)
    }

    /// A child token that also expires after `timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child(Some(Instant::now() + timeout))
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        let child = Arc::new(Inner {
            deadline,
            parent: Some(Arc::clone(&self.inner)),
            ..Inner::default()
        });
        let mut children = self.inner.children.lock().unwrap_or_else(|e| e.into_inner());
        children.retain(|w| w.strong_count() > 0);
        children.push(Arc::downgrade(&child));
        drop(children);
        if self.inner.is_cancelled() {
            child.cancel();
        }
        Self { inner: child }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` on cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = self.inner.effective_deadline();
        let mut until = Instant::now() + duration;
        if let Some(deadline) = deadline {
            until = until.min(deadline);
        }
        let mut flag = self.inner.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if *flag || self.inner.parent.as_ref().is_some_and(|p| p.is_cancelled()) {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return deadline.map_or(true, |d| now < d);
            }
            let (guard, _) = self
                .inner
                .wake
                .wait_timeout(flag, until - now)
                .unwrap_or_else(|e| e.into_inner());
            flag = guard;
        }
    }

    /// Whether two handles share the same cancellation state.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
