//! Overlap guards for periodic workflows.
//!
//! A [`CycleGuard`] is the per-workflow "is a cycle running" flag: a tick
//! that finds it held is dropped entirely, never queued. The flag is set
//! before work begins and released when the handle drops, so every exit
//! path (success, error, panic unwind) clears it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-owner overlap flag for one periodic workflow.
#[derive(Debug, Default)]
pub struct CycleGuard {
    running: AtomicBool,
}

impl CycleGuard {
    /// Creates a released guard.
    pub fn new() -> Self {
        Self { running: AtomicBool::new(false) }
    }

    /// Attempts to acquire the guard for one cycle.
    ///
    /// Returns `None` when a previous cycle is still running; the caller
    /// must then skip the tick without doing any work.
    pub fn try_acquire(&self) -> Option<CycleGuardHandle<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuardHandle { guard: self })
    }

    /// Whether a cycle currently holds the guard.
    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// RAII handle releasing the guard on drop.
#[derive(Debug)]
pub struct CycleGuardHandle<'a> {
    guard: &'a CycleGuard,
}

impl Drop for CycleGuardHandle<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let guard = CycleGuard::new();

        let handle = guard.try_acquire().expect("first acquire succeeds");
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());

        drop(handle);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn guard_released_on_unwind() {
        let guard = CycleGuard::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _handle = guard.try_acquire().unwrap();
            panic!("cycle blew up");
        }));

        assert!(result.is_err());
        assert!(!guard.is_held());
    }
}
