//! Atomic compare-and-swap on a lock state cell.
use std::sync::atomic::{AtomicI32, Ordering};

/// Atomically replaces the value at `location` with `desired` if it currently equals
/// `expected`.
///
/// Returns true if the swap was made, false if the value differed and `location` was
/// left untouched. A successful swap has acquire and release semantics, a failed one
/// is relaxed.
/// # Arguments
/// - location: cell to compare-and-swap
/// - expected: value that must be stored at `location` for the swap to occur
/// - desired: value stored at `location` after a successful swap
#[inline]
pub fn cas(location: &AtomicI32, expected: i32, desired: i32) -> bool {
    location
        .compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_once_then_fails() {
        let loc = AtomicI32::new(7);

        assert!(cas(&loc, 7, 42));
        assert_eq!(loc.load(Ordering::Relaxed), 42);

        assert!(!cas(&loc, 7, 42));
        assert_eq!(loc.load(Ordering::Relaxed), 42);
    }

    #[test]
    fn mismatch_leaves_value() {
        let loc = AtomicI32::new(0);
        assert!(!cas(&loc, 1, 0));
        assert_eq!(loc.load(Ordering::Relaxed), 0);
    }
}
