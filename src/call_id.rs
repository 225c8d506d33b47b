//! Correlation identifiers for in-flight host calls.
//!
//! Every wrapper invocation draws exactly one id before anything is stored
//! for that call. Ids are strictly increasing and never reused while the
//! call they name is still pending.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation identifier linking a host-call submission to its eventual
/// resolution delivery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl CallId {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Issues monotonically increasing correlation ids, starting from 1.
///
/// Wraparound at the width of `u64` is treated as unreachable in practice;
/// the counter saturates rather than cycling back into live ids.
#[derive(Debug)]
pub struct CallIdAllocator {
    next: u64,
}

impl CallIdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next id. Each call returns exactly one more than the last.
    pub const fn next(&mut self) -> CallId {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        CallId(id)
    }

    /// One past the highest id issued so far.
    #[must_use]
    pub const fn next_unissued(&self) -> u64 {
        self.next
    }
}

impl Default for CallIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase_by_exactly_one() {
        let mut allocator = CallIdAllocator::new();
        let mut previous = allocator.next();
        assert_eq!(previous, CallId(1));
        for _ in 0..1_000 {
            let id = allocator.next();
            assert_eq!(id.value(), previous.value() + 1);
            previous = id;
        }
    }

    #[test]
    fn next_unissued_tracks_the_counter() {
        let mut allocator = CallIdAllocator::new();
        assert_eq!(allocator.next_unissued(), 1);
        let _ = allocator.next();
        let _ = allocator.next();
        assert_eq!(allocator.next_unissued(), 3);
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(CallId(7).to_string(), "call-7");
    }
}
