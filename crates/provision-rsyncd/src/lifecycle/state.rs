//! Tri-state lifecycle flag shared by the controller, monitor and listener.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of a supervised daemon. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Running and monitored.
    Active,
    /// Teardown has been claimed by one caller.
    Disposing,
    /// Teardown has finished.
    Disposed,
}

impl LifecycleState {
    const fn as_raw(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Disposing => 1,
            Self::Disposed => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Disposing,
            _ => Self::Disposed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Disposing => f.write_str("disposing"),
            Self::Disposed => f.write_str("disposed"),
        }
    }
}

/// Atomic holder of the [`LifecycleState`].
#[derive(Debug)]
pub(crate) struct LifecycleFlag(AtomicU8);

impl LifecycleFlag {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Active.as_raw()))
    }

    pub(crate) fn load(&self) -> LifecycleState {
        LifecycleState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves `Active` to `Disposing`. Only the first caller gets `true`.
    pub(crate) fn begin_disposal(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Active.as_raw(),
                LifecycleState::Disposing.as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_disposal(&self) {
        self.0
            .store(LifecycleState::Disposed.as_raw(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn flag_starts_active() {
        assert_eq!(LifecycleFlag::new().load(), LifecycleState::Active);
    }

    #[test]
    fn only_first_claim_wins() {
        let flag = LifecycleFlag::new();
        assert!(flag.begin_disposal());
        assert!(!flag.begin_disposal());
        assert_eq!(flag.load(), LifecycleState::Disposing);
        flag.finish_disposal();
        assert!(!flag.begin_disposal());
        assert_eq!(flag.load(), LifecycleState::Disposed);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let flag = Arc::new(LifecycleFlag::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let contender = Arc::clone(&flag);
                thread::spawn(move || contender.begin_disposal())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("claim thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
